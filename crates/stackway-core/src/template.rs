use crate::document::{CapabilityMap, DocumentMeta, ParameterMap};
use crate::target::InfrastructureTarget;
use crate::time::Timestamp;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named provisioning stage grouping a subset of a SAT's services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackStage {
    pub name: String,
    pub services: Vec<String>,
}

/// Stack Application Template: the services a user wants plus the
/// requirements that apply across all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackApplicationTemplate {
    pub name: String,
    pub services: Vec<String>,
    #[serde(default)]
    pub extra_functional_requirements: ParameterMap,
    /// Policy bindings evaluated by the external policy engine; carried
    /// through but not interpreted here.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub policies: IndexMap<String, Vec<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StackStage>,
}

impl StackApplicationTemplate {
    pub fn new(name: impl Into<String>, services: Vec<String>) -> Self {
        Self {
            name: name.into(),
            services,
            extra_functional_requirements: ParameterMap::new(),
            policies: IndexMap::new(),
            stages: Vec::new(),
        }
    }

    pub fn with_extra_functional_requirement(
        mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.extra_functional_requirements.insert(key.into(), value);
        self
    }
}

/// Stack Infrastructure Template: the named targets an operator offers,
/// together with the derived capability map per target. The derived map is a
/// cache; `capabilities_refreshed_at` records when it was last rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInfrastructureTemplate {
    pub name: String,
    pub infrastructure_targets: Vec<InfrastructureTarget>,
    #[serde(default)]
    pub infrastructure_capabilities: IndexMap<String, CapabilityMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities_refreshed_at: Option<Timestamp>,
    #[serde(default)]
    pub meta: DocumentMeta,
}

impl StackInfrastructureTemplate {
    pub fn new(name: impl Into<String>, targets: Vec<InfrastructureTarget>) -> Self {
        Self {
            name: name.into(),
            infrastructure_targets: targets,
            infrastructure_capabilities: IndexMap::new(),
            capabilities_refreshed_at: None,
            meta: DocumentMeta::new(),
        }
    }

    pub fn capabilities_for(&self, target: &InfrastructureTarget) -> Option<&CapabilityMap> {
        self.infrastructure_capabilities.get(&target.to_string())
    }

    pub fn contains_target(&self, target: &InfrastructureTarget) -> bool {
        self.infrastructure_targets.contains(target)
    }

    /// Whether every declared target already has a capability map.
    pub fn capabilities_populated(&self) -> bool {
        self.infrastructure_targets
            .iter()
            .all(|t| self.infrastructure_capabilities.contains_key(&t.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn targets() -> Vec<InfrastructureTarget> {
        vec![
            "aws.eu.z1".parse().unwrap(),
            "vmw.eu.z1".parse().unwrap(),
        ]
    }

    #[test]
    fn test_sat_serde_roundtrip() {
        let sat = StackApplicationTemplate::new("web", vec!["web".to_string()])
            .with_extra_functional_requirement("zone", json!("green"));
        let value = serde_json::to_value(&sat).unwrap();
        assert_eq!(value["name"], "web");
        assert_eq!(value["extra_functional_requirements"]["zone"], "green");
        // Empty policies/stages stay off the wire.
        assert!(value.get("policies").is_none());
        assert!(value.get("stages").is_none());
        let back: StackApplicationTemplate = serde_json::from_value(value).unwrap();
        assert_eq!(back, sat);
    }

    #[test]
    fn test_sat_parses_stages() {
        let sat: StackApplicationTemplate = serde_json::from_value(json!({
            "name": "layered",
            "services": ["db", "app"],
            "stages": [{"name": "data", "services": ["db"]}]
        }))
        .unwrap();
        assert_eq!(sat.stages.len(), 1);
        assert_eq!(sat.stages[0].services, vec!["db"]);
    }

    #[test]
    fn test_sit_capability_lookup() {
        let mut sit = StackInfrastructureTemplate::new("prod", targets());
        assert!(!sit.capabilities_populated());

        let mut caps = CapabilityMap::new();
        caps.insert("CPU".to_string(), json!("4GHz"));
        sit.infrastructure_capabilities
            .insert("aws.eu.z1".to_string(), caps);

        let aws: InfrastructureTarget = "aws.eu.z1".parse().unwrap();
        assert_eq!(sit.capabilities_for(&aws).unwrap()["CPU"], "4GHz");
        assert!(!sit.capabilities_populated());

        sit.infrastructure_capabilities
            .insert("vmw.eu.z1".to_string(), CapabilityMap::new());
        assert!(sit.capabilities_populated());
    }

    #[test]
    fn test_sit_contains_target() {
        let sit = StackInfrastructureTemplate::new("prod", targets());
        let aws: InfrastructureTarget = "aws.eu.z1".parse().unwrap();
        let gcp: InfrastructureTarget = "gcp.us.z9".parse().unwrap();
        assert!(sit.contains_target(&aws));
        assert!(!sit.contains_target(&gcp));
    }
}

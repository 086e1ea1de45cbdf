use crate::error::CoreError;
use crate::time::Timestamp;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Ordered string-keyed parameter map. Insertion order is preserved because
/// merge precedence over these maps is order-sensitive.
pub type ParameterMap = IndexMap<String, Value>;

/// Capability map exposed by one infrastructure target after resolution.
pub type CapabilityMap = ParameterMap;

/// The closed set of document types the control plane persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Environment,
    Location,
    Zone,
    Service,
    FunctionalRequirement,
    StackApplicationTemplate,
    StackInfrastructureTemplate,
    StackInstance,
}

impl DocumentType {
    /// The three infrastructure base variants making up a dotted target triple,
    /// in merge order (later parts override earlier ones).
    pub const INFRASTRUCTURE_BASES: [DocumentType; 3] = [
        DocumentType::Environment,
        DocumentType::Location,
        DocumentType::Zone,
    ];

    pub fn is_infrastructure_base(&self) -> bool {
        matches!(
            self,
            DocumentType::Environment | DocumentType::Location | DocumentType::Zone
        )
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::Environment => write!(f, "environment"),
            DocumentType::Location => write!(f, "location"),
            DocumentType::Zone => write!(f, "zone"),
            DocumentType::Service => write!(f, "service"),
            DocumentType::FunctionalRequirement => write!(f, "functional_requirement"),
            DocumentType::StackApplicationTemplate => write!(f, "stack_application_template"),
            DocumentType::StackInfrastructureTemplate => {
                write!(f, "stack_infrastructure_template")
            }
            DocumentType::StackInstance => write!(f, "stack_instance"),
        }
    }
}

impl FromStr for DocumentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "environment" => Ok(DocumentType::Environment),
            "location" => Ok(DocumentType::Location),
            "zone" => Ok(DocumentType::Zone),
            "service" => Ok(DocumentType::Service),
            "functional_requirement" => Ok(DocumentType::FunctionalRequirement),
            "stack_application_template" => Ok(DocumentType::StackApplicationTemplate),
            "stack_infrastructure_template" => Ok(DocumentType::StackInfrastructureTemplate),
            "stack_instance" => Ok(DocumentType::StackInstance),
            _ => Err(CoreError::invalid_document_type(s)),
        }
    }
}

/// Metadata stamped on mutable documents at every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub last_updated: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DocumentMeta {
    pub fn new() -> Self {
        Self {
            last_updated: crate::time::now_utc(),
            version_id: None,
            description: None,
        }
    }

    pub fn with_version_id(mut self, version_id: String) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn update_timestamp(&mut self) {
        self.last_updated = crate::time::now_utc();
    }
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog entry describing one deployable service. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Ordered functional requirement names; order drives both provisioning
    /// order and the parameter merge precedence.
    #[serde(default)]
    pub functional_requirements: Vec<String>,
    #[serde(default)]
    pub non_functional_requirements: ParameterMap,
    #[serde(default)]
    pub params: ParameterMap,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functional_requirements: Vec::new(),
            non_functional_requirements: ParameterMap::new(),
            params: ParameterMap::new(),
        }
    }

    pub fn with_functional_requirements(mut self, frs: Vec<String>) -> Self {
        self.functional_requirements = frs;
        self
    }

    pub fn with_non_functional_requirement(
        mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.non_functional_requirements.insert(key.into(), value);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Catalog entry for one named unit of provisioning work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionalRequirement {
    pub name: String,
    #[serde(default)]
    pub params: ParameterMap,
}

impl FunctionalRequirement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: ParameterMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// One of the environment/location/zone base documents a target is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureBaseDocument {
    pub name: String,
    #[serde(default)]
    pub params: ParameterMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_type_display_roundtrip() {
        let all = [
            DocumentType::Environment,
            DocumentType::Location,
            DocumentType::Zone,
            DocumentType::Service,
            DocumentType::FunctionalRequirement,
            DocumentType::StackApplicationTemplate,
            DocumentType::StackInfrastructureTemplate,
            DocumentType::StackInstance,
        ];
        for doc_type in all {
            let parsed: DocumentType = doc_type.to_string().parse().unwrap();
            assert_eq!(parsed, doc_type);
        }
    }

    #[test]
    fn test_document_type_from_str_invalid() {
        assert!("warehouse".parse::<DocumentType>().is_err());
        assert!("".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_document_type_serde_wire_form() {
        let json = serde_json::to_string(&DocumentType::StackInstance).unwrap();
        assert_eq!(json, "\"stack_instance\"");
        let back: DocumentType = serde_json::from_str("\"functional_requirement\"").unwrap();
        assert_eq!(back, DocumentType::FunctionalRequirement);
    }

    #[test]
    fn test_infrastructure_base_classification() {
        assert!(DocumentType::Environment.is_infrastructure_base());
        assert!(DocumentType::Zone.is_infrastructure_base());
        assert!(!DocumentType::Service.is_infrastructure_base());
        assert_eq!(DocumentType::INFRASTRUCTURE_BASES.len(), 3);
    }

    #[test]
    fn test_document_meta_builders() {
        let meta = DocumentMeta::new()
            .with_version_id("3".to_string())
            .with_description("SIT refreshed");
        assert_eq!(meta.version_id.as_deref(), Some("3"));
        assert_eq!(meta.description.as_deref(), Some("SIT refreshed"));
    }

    #[test]
    fn test_service_builder_and_serde() {
        let service = Service::new("web")
            .with_functional_requirements(vec!["nginx".to_string()])
            .with_non_functional_requirement("CPU", json!("2GHz"))
            .with_param("port", json!(8080));

        let value = serde_json::to_value(&service).unwrap();
        assert_eq!(value["name"], "web");
        assert_eq!(value["functional_requirements"][0], "nginx");
        assert_eq!(value["non_functional_requirements"]["CPU"], "2GHz");

        let back: Service = serde_json::from_value(value).unwrap();
        assert_eq!(back, service);
    }

    #[test]
    fn test_service_defaults_when_fields_absent() {
        let service: Service = serde_json::from_value(json!({"name": "db"})).unwrap();
        assert!(service.functional_requirements.is_empty());
        assert!(service.non_functional_requirements.is_empty());
        assert!(service.params.is_empty());
    }

    #[test]
    fn test_functional_requirement_params() {
        let fr = FunctionalRequirement::new("nginx").with_param("worker_count", json!(4));
        assert_eq!(fr.params["worker_count"], json!(4));
    }

    #[test]
    fn test_parameter_map_preserves_insertion_order() {
        let mut map = ParameterMap::new();
        map.insert("zeta".to_string(), json!(1));
        map.insert("alpha".to_string(), json!(2));
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}

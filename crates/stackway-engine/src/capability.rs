//! Capability resolution: expands each SIT target into a flat capability map
//! by composing its environment, location, and zone base documents.

use serde_json::json;
use tracing::{debug, info};

use stackway_core::{CapabilityMap, InfrastructureTarget, StackInfrastructureTemplate, now_utc};
use stackway_storage::DocumentGateway;

use crate::error::Result;

/// When to rebuild a SIT's cached capability maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Rebuild unconditionally.
    Force,
    /// Return the SIT as-is.
    Skip,
    /// Rebuild unless every target already has a capability map younger than
    /// the configured TTL.
    Auto,
}

/// One post-processing rule injecting capabilities inferred from the target.
///
/// Rules run after the base-document merge, in registration order, so rules
/// can be added without touching the resolver.
pub trait CapabilityRule: Send + Sync {
    fn applies(&self, target: &InfrastructureTarget) -> bool;
    fn inject(&self, capabilities: &mut CapabilityMap);
}

/// Injects a fixed capability set whenever the dotted target name contains a
/// substring.
pub struct NameContainsRule {
    needle: String,
    capabilities: CapabilityMap,
}

impl NameContainsRule {
    pub fn new(needle: impl Into<String>, capabilities: CapabilityMap) -> Self {
        Self {
            needle: needle.into(),
            capabilities,
        }
    }
}

impl CapabilityRule for NameContainsRule {
    fn applies(&self, target: &InfrastructureTarget) -> bool {
        target.to_string().contains(&self.needle)
    }

    fn inject(&self, capabilities: &mut CapabilityMap) {
        for (key, value) in &self.capabilities {
            capabilities.insert(key.clone(), value.clone());
        }
    }
}

/// The stock rule set for the supported provider families.
pub fn default_rules() -> Vec<Box<dyn CapabilityRule>> {
    let mut aws = CapabilityMap::new();
    aws.insert("config".to_string(), json!(["Ubuntu", "Alpine", "DatabaseConfig"]));
    aws.insert("CPU".to_string(), json!("2GHz"));
    aws.insert("RAM".to_string(), json!("2GB"));

    let mut vmw = CapabilityMap::new();
    vmw.insert("config".to_string(), json!(["linux", "nginx"]));
    vmw.insert("CPU".to_string(), json!("4GHz"));
    vmw.insert("RAM".to_string(), json!("4GB"));

    vec![
        Box::new(NameContainsRule::new("aws", aws)),
        Box::new(NameContainsRule::new("vmw", vmw)),
    ]
}

/// Rebuilds a SIT's `infrastructure_capabilities` cache from the base
/// documents and the registered post-processing rules, then persists the SIT.
pub struct CapabilityResolver {
    gateway: DocumentGateway,
    rules: Vec<Box<dyn CapabilityRule>>,
    ttl_secs: u64,
}

impl CapabilityResolver {
    pub fn new(gateway: DocumentGateway, ttl_secs: u64) -> Self {
        Self {
            gateway,
            rules: default_rules(),
            ttl_secs,
        }
    }

    /// Replaces the rule set; rules run in the given order.
    pub fn with_rules(mut self, rules: Vec<Box<dyn CapabilityRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Whether the cached maps are complete and inside the TTL.
    fn cache_is_fresh(&self, sit: &StackInfrastructureTemplate) -> bool {
        if !sit.capabilities_populated() {
            return false;
        }
        match &sit.capabilities_refreshed_at {
            Some(refreshed_at) => {
                let age = refreshed_at.seconds_until(&now_utc());
                age >= 0 && (age as u64) <= self.ttl_secs
            }
            None => false,
        }
    }

    /// Applies the refresh policy to the SIT, rebuilding and persisting the
    /// capability cache when called for.
    pub async fn refresh(
        &self,
        sit: &mut StackInfrastructureTemplate,
        policy: RefreshPolicy,
    ) -> Result<()> {
        match policy {
            RefreshPolicy::Skip => {
                debug!(sit = %sit.name, "capability refresh skipped by policy");
                return Ok(());
            }
            RefreshPolicy::Auto if self.cache_is_fresh(sit) => {
                debug!(sit = %sit.name, "capability cache fresh, not rebuilding");
                return Ok(());
            }
            RefreshPolicy::Auto | RefreshPolicy::Force => {}
        }

        sit.infrastructure_capabilities.clear();
        for target in sit.infrastructure_targets.clone() {
            let capabilities = self.resolve_target(&target).await?;
            sit.infrastructure_capabilities
                .insert(target.to_string(), capabilities);
        }
        let refreshed_at = now_utc();
        sit.capabilities_refreshed_at = Some(refreshed_at.clone());
        sit.meta.update_timestamp();

        self.gateway
            .write_infrastructure_template(sit, format!("capabilities refreshed at {refreshed_at}"))
            .await?;
        info!(sit = %sit.name, targets = sit.infrastructure_targets.len(), "capability cache rebuilt");
        Ok(())
    }

    /// Merges the target's environment, location, and zone parameters (later
    /// parts override earlier ones), then runs the post-processing rules.
    async fn resolve_target(&self, target: &InfrastructureTarget) -> Result<CapabilityMap> {
        let mut capabilities = CapabilityMap::new();
        for (doc_type, name) in target.base_lookups() {
            let base = self.gateway.infrastructure_base(doc_type, name).await?;
            for (key, value) in base.params {
                capabilities.insert(key, value);
            }
        }
        for rule in &self.rules {
            if rule.applies(target) {
                rule.inject(&mut capabilities);
            }
        }
        Ok(capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::json;
    use stackway_core::DocumentType;
    use stackway_db_memory::InMemoryStore;
    use stackway_storage::DocumentStore;
    use std::sync::Arc;

    async fn seed_bases(gateway: &DocumentGateway) {
        let bases = [
            (DocumentType::Environment, "aws", json!({"cloud": true})),
            (DocumentType::Environment, "vmw", json!({"cloud": false})),
            (DocumentType::Location, "eu", json!({"region": "eu-west"})),
            (DocumentType::Zone, "z1", json!({"zone": "green"})),
        ];
        for (doc_type, name, params) in bases {
            gateway
                .store()
                .put(
                    doc_type,
                    name,
                    json!({"name": name, "params": params}),
                    None,
                    None,
                )
                .await
                .unwrap();
        }
    }

    fn sit() -> StackInfrastructureTemplate {
        StackInfrastructureTemplate::new(
            "prod",
            vec!["aws.eu.z1".parse().unwrap(), "vmw.eu.z1".parse().unwrap()],
        )
    }

    fn gateway() -> DocumentGateway {
        DocumentGateway::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_force_rebuild_merges_bases_and_rules() {
        let gw = gateway();
        seed_bases(&gw).await;
        let resolver = CapabilityResolver::new(gw.clone(), 300);

        let mut sit = sit();
        resolver.refresh(&mut sit, RefreshPolicy::Force).await.unwrap();

        let aws = sit.infrastructure_capabilities.get("aws.eu.z1").unwrap();
        assert_eq!(aws["cloud"], true);
        assert_eq!(aws["region"], "eu-west");
        assert_eq!(aws["zone"], "green");
        assert_eq!(aws["CPU"], "2GHz");
        assert_eq!(aws["config"], json!(["Ubuntu", "Alpine", "DatabaseConfig"]));

        let vmw = sit.infrastructure_capabilities.get("vmw.eu.z1").unwrap();
        assert_eq!(vmw["CPU"], "4GHz");
        assert_eq!(vmw["config"], json!(["linux", "nginx"]));

        // Rebuild persisted the SIT.
        let stored = gw.infrastructure_template("prod").await.unwrap();
        assert!(stored.capabilities_populated());
        assert!(stored.capabilities_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_skip_leaves_sit_untouched() {
        let gw = gateway();
        let resolver = CapabilityResolver::new(gw, 300);
        let mut sit = sit();
        resolver.refresh(&mut sit, RefreshPolicy::Skip).await.unwrap();
        assert!(sit.infrastructure_capabilities.is_empty());
    }

    #[tokio::test]
    async fn test_auto_is_noop_when_populated_and_fresh() {
        let gw = gateway();
        seed_bases(&gw).await;
        let resolver = CapabilityResolver::new(gw.clone(), 300);

        let mut sit = sit();
        resolver.refresh(&mut sit, RefreshPolicy::Force).await.unwrap();
        let refreshed_at = sit.capabilities_refreshed_at.clone();

        resolver.refresh(&mut sit, RefreshPolicy::Auto).await.unwrap();
        assert_eq!(sit.capabilities_refreshed_at, refreshed_at);
    }

    #[tokio::test]
    async fn test_auto_rebuilds_unpopulated_cache() {
        let gw = gateway();
        seed_bases(&gw).await;
        let resolver = CapabilityResolver::new(gw, 300);

        let mut sit = sit();
        resolver.refresh(&mut sit, RefreshPolicy::Auto).await.unwrap();
        assert!(sit.capabilities_populated());
    }

    #[tokio::test]
    async fn test_auto_rebuilds_expired_cache() {
        let gw = gateway();
        seed_bases(&gw).await;
        // TTL of zero: anything already stamped is stale.
        let resolver = CapabilityResolver::new(gw, 0);

        let mut sit = sit();
        resolver.refresh(&mut sit, RefreshPolicy::Force).await.unwrap();
        let first = sit.capabilities_refreshed_at.clone().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        resolver.refresh(&mut sit, RefreshPolicy::Auto).await.unwrap();
        assert!(sit.capabilities_refreshed_at.unwrap() > first);
    }

    #[tokio::test]
    async fn test_missing_base_document_fails() {
        let gw = gateway();
        let resolver = CapabilityResolver::new(gw, 300);
        let mut sit = sit();
        let err = resolver
            .refresh(&mut sit, RefreshPolicy::Force)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_custom_rule_replaces_defaults() {
        let gw = gateway();
        seed_bases(&gw).await;

        let mut extra = CapabilityMap::new();
        extra.insert("gpu".to_string(), json!("A100"));
        let resolver = CapabilityResolver::new(gw, 300)
            .with_rules(vec![Box::new(NameContainsRule::new("z1", extra))]);

        let mut sit = sit();
        resolver.refresh(&mut sit, RefreshPolicy::Force).await.unwrap();
        let aws = sit.infrastructure_capabilities.get("aws.eu.z1").unwrap();
        assert_eq!(aws["gpu"], "A100");
        assert!(aws.get("CPU").is_none());
    }
}

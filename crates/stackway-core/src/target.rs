use crate::document::DocumentType;
use crate::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An infrastructure target identified by the dotted triple
/// `environment.location.zone`. Targets order lexicographically on their
/// dotted form, which makes deterministic target selection a plain `min`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfrastructureTarget {
    environment: String,
    location: String,
    zone: String,
}

impl InfrastructureTarget {
    pub fn new(
        environment: impl Into<String>,
        location: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            location: location.into(),
            zone: zone.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// The (document type, name) lookups needed to resolve this target, in
    /// merge order.
    pub fn base_lookups(&self) -> [(DocumentType, &str); 3] {
        [
            (DocumentType::Environment, self.environment.as_str()),
            (DocumentType::Location, self.location.as_str()),
            (DocumentType::Zone, self.zone.as_str()),
        ]
    }
}

impl fmt::Display for InfrastructureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.environment, self.location, self.zone)
    }
}

impl FromStr for InfrastructureTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(env), Some(loc), Some(zone), None)
                if !env.is_empty() && !loc.is_empty() && !zone.is_empty() =>
            {
                Ok(InfrastructureTarget::new(env, loc, zone))
            }
            _ => Err(CoreError::invalid_target(s)),
        }
    }
}

impl Serialize for InfrastructureTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InfrastructureTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        InfrastructureTarget::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse_and_display() {
        let target: InfrastructureTarget = "aws.eu.z1".parse().unwrap();
        assert_eq!(target.environment(), "aws");
        assert_eq!(target.location(), "eu");
        assert_eq!(target.zone(), "z1");
        assert_eq!(target.to_string(), "aws.eu.z1");
    }

    #[test]
    fn test_target_parse_rejects_malformed() {
        assert!("aws.eu".parse::<InfrastructureTarget>().is_err());
        assert!("aws.eu.z1.extra".parse::<InfrastructureTarget>().is_err());
        assert!("aws..z1".parse::<InfrastructureTarget>().is_err());
        assert!("".parse::<InfrastructureTarget>().is_err());
    }

    #[test]
    fn test_target_ordering_is_lexicographic_on_dotted_form() {
        let aws: InfrastructureTarget = "aws.eu.z1".parse().unwrap();
        let vmw: InfrastructureTarget = "vmw.eu.z1".parse().unwrap();
        assert!(aws < vmw);
        let smallest = [vmw.clone(), aws.clone()].into_iter().min().unwrap();
        assert_eq!(smallest, aws);
    }

    #[test]
    fn test_target_serde_as_string() {
        let target: InfrastructureTarget = "vmw.eu.z1".parse().unwrap();
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, "\"vmw.eu.z1\"");
        let back: InfrastructureTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);
    }

    #[test]
    fn test_base_lookups_order() {
        let target: InfrastructureTarget = "aws.eu.z1".parse().unwrap();
        let lookups = target.base_lookups();
        assert_eq!(lookups[0], (DocumentType::Environment, "aws"));
        assert_eq!(lookups[1], (DocumentType::Location, "eu"));
        assert_eq!(lookups[2], (DocumentType::Zone, "z1"));
    }
}

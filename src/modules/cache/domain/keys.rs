/// Cache key layout shared by the stores and the invalidation engine.
///
/// Single entities live at `<prefix>:<domainType>:<id>`; cascading
/// invalidation additionally uses domain-wide (`<prefix>:<domainType>:*`)
/// and dependent-scoped (`<prefix>:<dep>:*:<domainType>:<id>`) patterns.
use serde::{Deserialize, Serialize};

/// Domain types participating in cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    Phase,
    Event,
    Team,
    Standing,
}

impl DomainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainType::Phase => "phase",
            DomainType::Event => "event",
            DomainType::Team => "team",
            DomainType::Standing => "standing",
        }
    }
}

impl std::fmt::Display for DomainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DomainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "phase" => Ok(DomainType::Phase),
            "event" => Ok(DomainType::Event),
            "team" => Ok(DomainType::Team),
            "standing" => Ok(DomainType::Standing),
            _ => Err(format!("Invalid domain type: {}", s)),
        }
    }
}

/// Builds cache keys and match patterns under a fixed prefix.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Primary key for a single entity, e.g. `cache:phase:1`.
    pub fn entity(&self, domain: DomainType, entity_id: &str) -> String {
        format!("{}:{}:{}", self.prefix, domain.as_str(), entity_id)
    }

    /// Pattern covering every key of a domain type, e.g. `cache:event:*`.
    pub fn domain_pattern(&self, domain: DomainType) -> String {
        format!("{}:{}:*", self.prefix, domain.as_str())
    }

    /// Pattern for dependent entries derived from one changed entity, e.g.
    /// `cache:event:*:phase:1` for events embedding phase 1 boundaries.
    pub fn dependent_pattern(&self, dependent: DomainType, via: DomainType, entity_id: &str) -> String {
        format!(
            "{}:{}:*:{}:{}",
            self.prefix,
            dependent.as_str(),
            via.as_str(),
            entity_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_type_display() {
        assert_eq!(DomainType::Phase.to_string(), "phase");
        assert_eq!(DomainType::Standing.to_string(), "standing");
    }

    #[test]
    fn test_domain_type_from_str() {
        assert_eq!("event".parse::<DomainType>().unwrap(), DomainType::Event);
        assert_eq!("TEAM".parse::<DomainType>().unwrap(), DomainType::Team);
        assert!("season".parse::<DomainType>().is_err());
    }

    #[test]
    fn test_key_layout() {
        let keys = CacheKeys::new("cache");
        assert_eq!(keys.entity(DomainType::Phase, "1"), "cache:phase:1");
        assert_eq!(keys.domain_pattern(DomainType::Event), "cache:event:*");
        assert_eq!(
            keys.dependent_pattern(DomainType::Event, DomainType::Phase, "1"),
            "cache:event:*:phase:1"
        );
    }
}

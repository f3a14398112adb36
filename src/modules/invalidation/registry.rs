use crate::modules::cache::domain::DomainType;
use std::collections::HashMap;

/// Static fan-out table: which domain types must be invalidated when a given
/// type changes.
///
/// The table is supplied at startup and read-only afterwards, so the
/// invalidation fan-out stays auditable and changing it is a redeploy, not a
/// data migration. Cycles are tolerated; the engine guards traversal with a
/// visited set.
#[derive(Debug, Clone, Default)]
pub struct DependencyRegistry {
    edges: HashMap<DomainType, Vec<DomainType>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    pub fn with_dependents(mut self, domain: DomainType, dependents: &[DomainType]) -> Self {
        self.edges.insert(domain, dependents.to_vec());
        self
    }

    /// Dependent domain types of `domain`, in registration order. Unregistered
    /// types have no dependents.
    pub fn dependents_of(&self, domain: DomainType) -> &[DomainType] {
        self.edges.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Stock graph for the sports model: phase boundaries shape event aggregates
/// and standings, event results feed standings, and team changes touch event
/// projections.
pub fn default_registry() -> DependencyRegistry {
    DependencyRegistry::new()
        .with_dependents(
            DomainType::Phase,
            &[DomainType::Event, DomainType::Standing],
        )
        .with_dependents(DomainType::Event, &[DomainType::Standing])
        .with_dependents(DomainType::Team, &[DomainType::Event])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_preserves_order() {
        let registry = default_registry();
        assert_eq!(
            registry.dependents_of(DomainType::Phase),
            &[DomainType::Event, DomainType::Standing]
        );
    }

    #[test]
    fn test_unregistered_type_has_no_dependents() {
        let registry = default_registry();
        assert!(registry.dependents_of(DomainType::Standing).is_empty());
    }
}

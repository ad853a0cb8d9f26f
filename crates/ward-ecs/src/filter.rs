//! Component-set filters for entity searches.
//!
//! Filters match whole archetypes, never individual entities, so a
//! search touches only the tables whose component set qualifies.

use crate::{ComponentSet, TypeId};

/// A predicate over an archetype's component set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Matches archetypes with exactly this set.
    Exact(ComponentSet),
    /// Matches archetypes containing at least this set.
    Contains(ComponentSet),
    /// Matches when every inner filter matches.
    And(Vec<Filter>),
    /// Matches when any inner filter matches.
    Or(Vec<Filter>),
    /// Inverts the inner filter.
    Not(Box<Filter>),
}

impl Filter {
    #[must_use]
    pub fn exact(ids: &[TypeId]) -> Self {
        let mut set: ComponentSet = ids.iter().copied().collect();
        set.sort_unstable();
        Self::Exact(set)
    }

    #[must_use]
    pub fn contains(ids: &[TypeId]) -> Self {
        let mut set: ComponentSet = ids.iter().copied().collect();
        set.sort_unstable();
        Self::Contains(set)
    }

    #[must_use]
    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    #[must_use]
    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Whether an archetype with the given canonical set matches.
    #[must_use]
    pub fn matches(&self, set: &[TypeId]) -> bool {
        match self {
            Filter::Exact(want) => want.as_slice() == set,
            Filter::Contains(want) => want.iter().all(|id| set.binary_search(id).is_ok()),
            Filter::And(filters) => filters.iter().all(|f| f.matches(set)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(set)),
            Filter::Not(filter) => !filter.matches(set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(raw: u16) -> TypeId {
        TypeId::from_raw(raw)
    }

    fn set(ids: &[u16]) -> ComponentSet {
        ids.iter().map(|&i| tid(i)).collect()
    }

    #[test]
    fn test_exact() {
        let filter = Filter::exact(&[tid(2), tid(1)]);
        assert!(filter.matches(&set(&[1, 2])));
        assert!(!filter.matches(&set(&[1])));
        assert!(!filter.matches(&set(&[1, 2, 3])));
    }

    #[test]
    fn test_contains() {
        let filter = Filter::contains(&[tid(2)]);
        assert!(filter.matches(&set(&[1, 2])));
        assert!(filter.matches(&set(&[2])));
        assert!(!filter.matches(&set(&[1, 3])));
    }

    #[test]
    fn test_composition() {
        let filter = Filter::and(vec![
            Filter::contains(&[tid(1)]),
            Filter::not(Filter::contains(&[tid(3)])),
        ]);
        assert!(filter.matches(&set(&[1, 2])));
        assert!(!filter.matches(&set(&[1, 3])));

        let either = Filter::or(vec![Filter::exact(&[tid(1)]), Filter::exact(&[tid(2)])]);
        assert!(either.matches(&set(&[1])));
        assert!(either.matches(&set(&[2])));
        assert!(!either.matches(&set(&[1, 2])));
    }
}

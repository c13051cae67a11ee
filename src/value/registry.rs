//! Abstract-type compatibility rules.
//!
//! Rules are directed: registering `a -> [b, c]` says a value of abstract
//! type `a` may flow where `b` or `c` is expected. A type with no rules of
//! its own is only compatible with other types that have no rules either.

use std::collections::{HashMap, HashSet};

/// Directed compatibility table between abstract type names.
///
/// Pipelines share one registry behind an `Arc`; it is configured before
/// elements are connected and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityRegistry {
    rules: HashMap<String, HashSet<String>>,
}

impl CompatibilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `from` is compatible with each of `to`.
    ///
    /// `from` is always compatible with itself, so registering it with an
    /// empty list still takes it out of the "unregistered" group.
    pub fn register<I, S>(&mut self, from: impl Into<String>, to: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.rules.entry(from.into()).or_default();
        entry.extend(to.into_iter().map(Into::into));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_rule<I, S>(mut self, from: impl Into<String>, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(from, to);
        self
    }

    pub fn is_registered(&self, abstract_type: &str) -> bool {
        self.rules.contains_key(abstract_type)
    }

    /// Whether a value of abstract type `from` may be used as `to`.
    pub fn is_compatible(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        match self.rules.get(from) {
            Some(allowed) => allowed.contains(to),
            None => !self.rules.contains_key(to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_types_are_compatible() {
        let reg = CompatibilityRegistry::new();
        assert!(reg.is_compatible("intensity", "intensity"));
    }

    #[test]
    fn test_unregistered_types_are_mutually_compatible() {
        let reg = CompatibilityRegistry::new().with_rule("angle", ["theta"]);
        assert!(reg.is_compatible("foo", "bar"));
        assert!(!reg.is_compatible("foo", "angle"));
    }

    #[test]
    fn test_registered_rules_are_directed() {
        let reg = CompatibilityRegistry::new().with_rule("angle", ["theta", "two_theta"]);
        assert!(reg.is_compatible("angle", "theta"));
        assert!(reg.is_compatible("angle", "two_theta"));
        assert!(!reg.is_compatible("angle", "energy"));
        // "theta" has no rules of its own and "angle" does.
        assert!(!reg.is_compatible("theta", "angle"));
    }

    #[test]
    fn test_register_with_empty_list() {
        let mut reg = CompatibilityRegistry::new();
        reg.register("strict", Vec::<String>::new());
        assert!(reg.is_registered("strict"));
        assert!(!reg.is_compatible("strict", "loose"));
        assert!(reg.is_compatible("strict", "strict"));
    }
}

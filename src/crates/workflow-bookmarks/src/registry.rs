//! Stimulus registration
//!
//! A [`StimulusRegistry`] lists the stimulus names a host knows about and, for each, which
//! payload fields take part in correlation. It is an ordinary value handed to the resolver
//! and the service, so every test can build an isolated one.

use crate::error::{BookmarkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Which top-level payload fields contribute to a bookmark hash
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationPolicy {
    /// Only these fields are hashed; `None` hashes every field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeSet<String>>,

    /// Fields never hashed, e.g. timestamps
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded: BTreeSet<String>,

    /// Array fields whose element order does not matter
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unordered: BTreeSet<String>,
}

impl CorrelationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict hashing to the given fields
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Exclude a field from hashing
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.excluded.insert(field.into());
        self
    }

    /// Treat an array field as an unordered set
    pub fn unordered(mut self, field: impl Into<String>) -> Self {
        self.unordered.insert(field.into());
        self
    }

    /// Whether `field` takes part in correlation
    pub fn includes(&self, field: &str) -> bool {
        if self.excluded.contains(field) {
            return false;
        }
        match &self.fields {
            Some(fields) => fields.contains(field),
            None => true,
        }
    }
}

/// A known stimulus and its correlation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusDescriptor {
    pub name: String,

    #[serde(default)]
    pub correlation: CorrelationPolicy,
}

impl StimulusDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation: CorrelationPolicy::default(),
        }
    }

    /// Set the correlation policy
    pub fn with_correlation(mut self, correlation: CorrelationPolicy) -> Self {
        self.correlation = correlation;
        self
    }
}

/// Registered stimuli, keyed by name
#[derive(Debug, Clone, Default)]
pub struct StimulusRegistry {
    descriptors: HashMap<String, StimulusDescriptor>,
    default_policy: CorrelationPolicy,
    strict: bool,
}

impl StimulusRegistry {
    /// Create a permissive registry: unknown names hash with the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that rejects unregistered stimulus names
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Build a registry from descriptors, rejecting empty or duplicate names
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = StimulusDescriptor>,
        strict: bool,
    ) -> Result<Self> {
        let mut registry = Self {
            strict,
            ..Self::default()
        };
        for descriptor in descriptors {
            registry.try_register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a descriptor, replacing any previous one with the same name
    pub fn register(mut self, descriptor: StimulusDescriptor) -> Self {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        self
    }

    fn try_register(&mut self, descriptor: StimulusDescriptor) -> Result<()> {
        if descriptor.name.trim().is_empty() {
            return Err(BookmarkError::Config("stimulus name must not be empty".to_string()));
        }
        if self.descriptors.contains_key(&descriptor.name) {
            return Err(BookmarkError::Config(format!(
                "stimulus '{}' registered twice",
                descriptor.name
            )));
        }
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Policy applied to names without a descriptor
    pub fn with_default_policy(mut self, policy: CorrelationPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn get(&self, name: &str) -> Option<&StimulusDescriptor> {
        self.descriptors.get(name)
    }

    /// Correlation policy for `name`
    pub fn policy_for(&self, name: &str) -> &CorrelationPolicy {
        self.descriptors
            .get(name)
            .map(|d| &d.correlation)
            .unwrap_or(&self.default_policy)
    }

    /// Fail with `UnknownStimulus` if the registry is strict and `name` is not registered
    pub fn ensure_known(&self, name: &str) -> Result<()> {
        if self.strict && !self.descriptors.contains_key(name) {
            return Err(BookmarkError::UnknownStimulus(name.to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_includes() {
        let policy = CorrelationPolicy::new()
            .with_fields(["orderId", "receivedAt"])
            .exclude("receivedAt");

        assert!(policy.includes("orderId"));
        assert!(!policy.includes("receivedAt"));
        assert!(!policy.includes("amount"));
        assert!(CorrelationPolicy::new().includes("anything"));
    }

    #[test]
    fn test_strict_registry() {
        let registry = StimulusRegistry::strict().register(StimulusDescriptor::new("OrderPaid"));

        assert!(registry.ensure_known("OrderPaid").is_ok());
        assert!(matches!(
            registry.ensure_known("OrderShipped"),
            Err(BookmarkError::UnknownStimulus(name)) if name == "OrderShipped"
        ));
        assert!(StimulusRegistry::new().ensure_known("OrderShipped").is_ok());
    }

    #[test]
    fn test_from_descriptors_rejects_duplicates() {
        let result = StimulusRegistry::from_descriptors(
            vec![StimulusDescriptor::new("Timer"), StimulusDescriptor::new("Timer")],
            false,
        );
        assert!(matches!(result, Err(BookmarkError::Config(_))));
    }

    #[test]
    fn test_policy_for_falls_back_to_default() {
        let registry = StimulusRegistry::new()
            .with_default_policy(CorrelationPolicy::new().exclude("ts"))
            .register(StimulusDescriptor::new("OrderPaid"));

        assert!(registry.policy_for("OrderPaid").includes("ts"));
        assert!(!registry.policy_for("Unknown").includes("ts"));
    }
}

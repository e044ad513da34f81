//! Graph runtime configuration

use serde::{Deserialize, Serialize};

/// What the runtime does when a node fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the error in the state, treat the node as finished without a
    /// patch and keep running downstream nodes.
    #[default]
    Record,
    /// Stop the invocation and return the error.
    Abort,
}

/// Graph runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum concurrently running nodes
    pub parallelism: usize,

    /// Node failure handling
    pub error_policy: ErrorPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl GraphConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set parallelism level
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set the node failure policy
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert!(config.parallelism >= 1);
        assert_eq!(config.error_policy, ErrorPolicy::Record);
    }

    #[test]
    fn test_builder_clamps_parallelism() {
        let config = GraphConfig::new()
            .with_parallelism(0)
            .with_error_policy(ErrorPolicy::Abort);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.error_policy, ErrorPolicy::Abort);
    }

    #[test]
    fn test_policy_serde() {
        assert_eq!(serde_json::to_string(&ErrorPolicy::Abort).unwrap(), r#""abort""#);
        let parsed: ErrorPolicy = serde_json::from_str(r#""record""#).unwrap();
        assert_eq!(parsed, ErrorPolicy::Record);
    }
}

//! Turn limits shared by every loop instance.

use serde::{Deserialize, Serialize};

/// Highest delegation depth any configuration may ask for.
pub const MAX_DELEGATION_DEPTH_CEILING: u32 = 5;

/// Bounds applied to every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnLimits {
    /// Maximum model invocations per turn (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// How many hops a chain of delegations may go below the user turn
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,

    /// Per model call
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    /// Per tool call
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Per memory retrieve/store
    #[serde(default = "default_memory_timeout")]
    pub memory_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    25
}
fn default_max_delegation_depth() -> u32 {
    2
}
fn default_model_timeout() -> u64 {
    120
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_memory_timeout() -> u64 {
    5
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_delegation_depth: default_max_delegation_depth(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            memory_timeout_secs: default_memory_timeout(),
        }
    }
}

impl TurnLimits {
    /// Whether a turn at `depth` may still delegate one level further.
    pub fn can_delegate_from(&self, depth: u32) -> bool {
        depth < self.max_delegation_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = TurnLimits::default();
        assert_eq!(limits.max_iterations, 25);
        assert_eq!(limits.max_delegation_depth, 2);
        assert!(limits.max_delegation_depth <= MAX_DELEGATION_DEPTH_CEILING);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let limits: TurnLimits = serde_json::from_str(r#"{"max_iterations": 3}"#).unwrap();
        assert_eq!(limits.max_iterations, 3);
        assert_eq!(limits.tool_timeout_secs, 30);
    }

    #[test]
    fn delegation_room() {
        let limits = TurnLimits::default();
        assert!(limits.can_delegate_from(0));
        assert!(limits.can_delegate_from(1));
        assert!(!limits.can_delegate_from(2));
    }
}

//! Model selection and usage bookkeeping types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A generative model the invoker may fall back to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Remote model identifier (e.g., "gemini-2.0-flash")
    pub id: String,
    /// Lower number = tried earlier
    pub priority: u32,
}

impl ModelCandidate {
    pub fn new(id: impl Into<String>, priority: u32) -> Self {
        Self {
            id: id.into(),
            priority,
        }
    }

    /// Build an ordered candidate list, priority following list position
    pub fn ordered<S: AsRef<str>>(ids: &[S]) -> Vec<Self> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Self::new(id.as_ref(), i as u32 + 1))
            .collect()
    }
}

/// Current state of a configured model, for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub id: String,
    pub priority: u32,
    pub cooling_down: bool,
    /// Milliseconds until the model is eligible again (0 when available)
    pub cooldown_remaining_ms: u64,
}

/// Snapshot of API usage in the current window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub total_calls: u64,
    pub rate_limit_count: u64,
    pub per_model_calls: HashMap<String, u64>,
    pub per_model_rate_limits: HashMap<String, u64>,
    pub next_reset_in_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_candidates() {
        let candidates = ModelCandidate::ordered(&["a", "b", "c"]);
        assert_eq!(candidates[0], ModelCandidate::new("a", 1));
        assert_eq!(candidates[2].priority, 3);
    }

    #[test]
    fn test_usage_snapshot_wire_names() {
        let snapshot = UsageSnapshot {
            total_calls: 3,
            next_reset_in_ms: 10,
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["totalCalls"], 3);
        assert_eq!(json["nextResetInMs"], 10);
        assert!(json.get("perModelRateLimits").is_some());
    }
}

#![forbid(unsafe_code)]

use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::placement::PlacementConfig;
use crate::validate::CyclePolicy;
use serde::{Deserialize, Serialize};

pub const ENV_CYCLE_POLICY: &str = "BRAINDUMP_CYCLE_POLICY";
pub const ENV_HISTORY_LIMIT: &str = "BRAINDUMP_HISTORY_LIMIT";
pub const ENV_ENRICH: &str = "BRAINDUMP_ENRICH";
pub const ENV_PLACEMENT_MARGIN: &str = "BRAINDUMP_PLACEMENT_MARGIN";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub placement: PlacementConfig,
    pub cycle_policy: CyclePolicy,
    pub history_limit: usize,
    /// Ask the enricher for a summary and embedding after each confirmed create.
    pub enrich_on_create: bool,
    /// Capacity of the change-notification channel.
    pub event_capacity: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            placement: PlacementConfig::default(),
            cycle_policy: CyclePolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            enrich_on_create: true,
            event_capacity: 256,
        }
    }
}

impl CanvasConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `BRAINDUMP_*` overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(ENV_CYCLE_POLICY) {
            self.cycle_policy =
                CyclePolicy::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_CYCLE_POLICY,
                    value: raw.clone(),
                    expected: "same_type or all_edges",
                })?;
        }
        if let Some(raw) = lookup(ENV_HISTORY_LIMIT) {
            self.history_limit =
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_HISTORY_LIMIT,
                        value: raw.clone(),
                        expected: "a non-negative integer",
                    })?;
        }
        if let Some(raw) = lookup(ENV_ENRICH) {
            self.enrich_on_create = parse_flag(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_ENRICH,
                value: raw.clone(),
                expected: "1, 0, true or false",
            })?;
        }
        if let Some(raw) = lookup(ENV_PLACEMENT_MARGIN) {
            let margin = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|m| m.is_finite() && *m >= 0.0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_PLACEMENT_MARGIN,
                    value: raw.clone(),
                    expected: "a non-negative number",
                })?;
            self.placement.margin = margin;
        }
        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn overrides_apply() {
        let config = CanvasConfig::default()
            .with_overrides(lookup(&[
                (ENV_CYCLE_POLICY, "all_edges"),
                (ENV_HISTORY_LIMIT, "5"),
                (ENV_ENRICH, "off"),
                (ENV_PLACEMENT_MARGIN, "12.5"),
            ]))
            .unwrap();
        assert_eq!(config.cycle_policy, CyclePolicy::AllEdges);
        assert_eq!(config.history_limit, 5);
        assert!(!config.enrich_on_create);
        assert_eq!(config.placement.margin, 12.5);
    }

    #[test]
    fn malformed_values_are_reported() {
        let err = CanvasConfig::default()
            .with_overrides(lookup(&[(ENV_CYCLE_POLICY, "sometimes")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: ENV_CYCLE_POLICY,
                ..
            }
        ));
        assert!(
            CanvasConfig::default()
                .with_overrides(lookup(&[(ENV_PLACEMENT_MARGIN, "-3")]))
                .is_err()
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: CanvasConfig =
            serde_json::from_str(r#"{ "cycle_policy": "all_edges", "placement": { "margin": 4.0 } }"#)
                .unwrap();
        assert_eq!(config.cycle_policy, CyclePolicy::AllEdges);
        assert_eq!(config.placement.margin, 4.0);
        assert_eq!(config.placement.ring_count, PlacementConfig::default().ring_count);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }
}

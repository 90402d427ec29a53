//! Tracker configuration
//!
//! Options are read once, when the tracker is built. Every option is optional
//! and any value that is missing or unusable falls back to its default instead
//! of failing; [`ConfigReport`] records which options did so.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TrackerError;

/// Default depth ratio that triggers classification
pub const DEFAULT_THRESHOLD_DEPTH: f64 = 0.8;

/// Default reader/skimmer boundary in pixels per second
pub const DEFAULT_SPEED_STANDARD: f64 = 300.0;

/// Default value of the `event` field in published records
pub const DEFAULT_EVENT_NAME: &str = "specific_reader";

/// Default cap, in minutes, on the time a single sample may contribute
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 5;

/// Typed tracker configuration.
///
/// Serialises in camelCase, the shape page authors write their overrides in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Depth ratio (0..1) above which the threshold trigger fires
    pub threshold_depth: f64,
    /// Speed (px/s) above which a threshold crossing is labelled `skimmer`
    pub speed_standard: f64,
    /// Event name written into the published record
    pub event_name: String,
    /// Per-sample elapsed time cap, in minutes
    pub timeout_minutes: u32,
    /// Emit diagnostic traces through the `log` facade
    pub debug: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            threshold_depth: DEFAULT_THRESHOLD_DEPTH,
            speed_standard: DEFAULT_SPEED_STANDARD,
            event_name: DEFAULT_EVENT_NAME.to_string(),
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            debug: false,
        }
    }
}

/// An option that was present but unusable and therefore replaced by its default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFallback {
    /// Option name (camelCase)
    pub option: String,
    /// Why the supplied value was rejected
    pub reason: String,
}

/// Effective configuration plus the options that fell back to defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigReport {
    pub config: TrackerConfig,
    pub fallbacks: Vec<ConfigFallback>,
}

impl TrackerConfig {
    /// Parse user overrides from a JSON document.
    ///
    /// Only a document that is not JSON at all is an error; unusable options
    /// are silently replaced by their defaults.
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        Ok(Self::resolve_json(json)?.config)
    }

    /// Like [`TrackerConfig::from_json`], but also reports the fallbacks
    pub fn resolve_json(json: &str) -> Result<ConfigReport, TrackerError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| TrackerError::Config(format!("config is not valid JSON: {}", e)))?;
        Ok(Self::resolve(&value))
    }

    /// Build a configuration from an already-parsed overrides value.
    ///
    /// Anything other than a JSON object yields the defaults.
    pub fn from_value(value: &Value) -> Self {
        Self::resolve(value).config
    }

    /// Resolve overrides against the defaults, recording every fallback
    pub fn resolve(value: &Value) -> ConfigReport {
        let mut fallbacks = Vec::new();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                fallbacks.push(ConfigFallback {
                    option: "*".to_string(),
                    reason: "overrides must be a JSON object".to_string(),
                });
            }
            return ConfigReport {
                config: Self::default(),
                fallbacks,
            };
        };

        let defaults = Self::default();
        let config = Self {
            threshold_depth: pick(
                map,
                "thresholdDepth",
                "threshold_depth",
                parse_non_negative,
                defaults.threshold_depth,
                &mut fallbacks,
            ),
            speed_standard: pick(
                map,
                "speedStandard",
                "speed_standard",
                parse_non_negative,
                defaults.speed_standard,
                &mut fallbacks,
            ),
            event_name: pick(
                map,
                "eventName",
                "event_name",
                parse_event_name,
                defaults.event_name,
                &mut fallbacks,
            ),
            timeout_minutes: pick(
                map,
                "timeoutMinutes",
                "timeout_minutes",
                parse_timeout,
                defaults.timeout_minutes,
                &mut fallbacks,
            ),
            debug: pick(
                map,
                "debug",
                "debug",
                |v| v.as_bool().ok_or_else(|| "expected a boolean".to_string()),
                defaults.debug,
                &mut fallbacks,
            ),
        };

        ConfigReport { config, fallbacks }
    }

    /// Replace any out-of-range field with its default.
    ///
    /// Applied by the tracker constructor so configs built in code obey the
    /// same rules as configs parsed from JSON.
    pub fn sanitized(self) -> ConfigReport {
        let value = serde_json::to_value(&self).unwrap_or(Value::Null);
        // Non-finite floats serialise to null, which `resolve` treats as invalid.
        Self::resolve(&value)
    }

    /// Per-sample cap on elapsed time, in milliseconds
    pub fn timeout_ms(&self) -> i64 {
        i64::from(self.timeout_minutes) * 60_000
    }
}

fn pick<T>(
    map: &Map<String, Value>,
    camel: &str,
    snake: &str,
    parse: impl Fn(&Value) -> Result<T, String>,
    default: T,
    fallbacks: &mut Vec<ConfigFallback>,
) -> T {
    let Some(raw) = map.get(camel).or_else(|| map.get(snake)) else {
        return default;
    };
    match parse(raw) {
        Ok(value) => value,
        Err(reason) => {
            fallbacks.push(ConfigFallback {
                option: camel.to_string(),
                reason,
            });
            default
        }
    }
}

fn parse_non_negative(value: &Value) -> Result<f64, String> {
    match value.as_f64() {
        Some(n) if n.is_finite() && n >= 0.0 => Ok(n),
        Some(n) => Err(format!("expected a non-negative finite number, got {}", n)),
        None => Err("expected a number".to_string()),
    }
}

fn parse_event_name(value: &Value) -> Result<String, String> {
    match value.as_str() {
        Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
        Some(_) => Err("event name must not be empty".to_string()),
        None => Err("expected a string".to_string()),
    }
}

fn parse_timeout(value: &Value) -> Result<u32, String> {
    let minutes = match (value.as_u64(), value.as_f64()) {
        (Some(n), _) => n,
        (None, Some(f)) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => f as u64,
        _ => return Err("expected a whole number of minutes".to_string()),
    };
    if minutes == 0 {
        return Err("timeout must be at least one minute".to_string());
    }
    u32::try_from(minutes).map_err(|_| format!("timeout of {} minutes is too large", minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.threshold_depth, 0.8);
        assert_eq!(config.speed_standard, 300.0);
        assert_eq!(config.event_name, "specific_reader");
        assert_eq!(config.timeout_minutes, 5);
        assert!(!config.debug);
        assert_eq!(config.timeout_ms(), 300_000);
    }

    #[test]
    fn test_camel_case_overrides() {
        let config = TrackerConfig::from_json(
            r#"{
                "thresholdDepth": 0.6,
                "speedStandard": 450,
                "eventName": "content_consumption",
                "timeoutMinutes": 2,
                "debug": true
            }"#,
        )
        .unwrap();

        assert_eq!(
            config,
            TrackerConfig {
                threshold_depth: 0.6,
                speed_standard: 450.0,
                event_name: "content_consumption".to_string(),
                timeout_minutes: 2,
                debug: true,
            }
        );
    }

    #[test]
    fn test_snake_case_overrides() {
        let config = TrackerConfig::from_value(&json!({ "speed_standard": 120, "timeout_minutes": 1 }));
        assert_eq!(config.speed_standard, 120.0);
        assert_eq!(config.timeout_minutes, 1);
        assert_eq!(config.threshold_depth, DEFAULT_THRESHOLD_DEPTH);
    }

    #[test]
    fn test_invalid_options_fall_back() {
        let report = TrackerConfig::resolve(&json!({
            "thresholdDepth": "deep",
            "speedStandard": -5,
            "eventName": "",
            "timeoutMinutes": 0,
            "debug": "yes"
        }));

        assert_eq!(report.config, TrackerConfig::default());
        let options: Vec<&str> = report.fallbacks.iter().map(|f| f.option.as_str()).collect();
        assert_eq!(
            options,
            vec!["thresholdDepth", "speedStandard", "eventName", "timeoutMinutes", "debug"]
        );
    }

    #[test]
    fn test_fractional_timeout_rejected() {
        let report = TrackerConfig::resolve(&json!({ "timeoutMinutes": 2.5 }));
        assert_eq!(report.config.timeout_minutes, DEFAULT_TIMEOUT_MINUTES);
        assert_eq!(report.fallbacks.len(), 1);

        let whole = TrackerConfig::from_value(&json!({ "timeoutMinutes": 3.0 }));
        assert_eq!(whole.timeout_minutes, 3);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let report = TrackerConfig::resolve(&json!({ "colour": "blue" }));
        assert_eq!(report.config, TrackerConfig::default());
        assert!(report.fallbacks.is_empty());
    }

    #[test]
    fn test_non_object_yields_defaults() {
        let report = TrackerConfig::resolve(&json!([1, 2, 3]));
        assert_eq!(report.config, TrackerConfig::default());
        assert_eq!(report.fallbacks.len(), 1);

        let null = TrackerConfig::resolve(&Value::Null);
        assert!(null.fallbacks.is_empty());
    }

    #[test]
    fn test_malformed_json_is_error() {
        let result = TrackerConfig::from_json("{ not json");
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_sanitized_replaces_non_finite() {
        let config = TrackerConfig {
            threshold_depth: f64::NAN,
            ..TrackerConfig::default()
        };
        let report = config.sanitized();
        assert_eq!(report.config.threshold_depth, DEFAULT_THRESHOLD_DEPTH);
        assert_eq!(report.fallbacks[0].option, "thresholdDepth");
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(TrackerConfig::default()).unwrap();
        assert_eq!(value["thresholdDepth"], 0.8);
        assert_eq!(value["eventName"], "specific_reader");
        assert_eq!(value["timeoutMinutes"], 5);
    }
}

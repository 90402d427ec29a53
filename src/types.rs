//! Classification types
//!
//! Labels, emission triggers and the record published once per page view.

use serde::{Deserialize, Serialize};

/// Engagement label assigned to a page view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderType {
    /// Reached the depth threshold at or below the speed standard
    Reader,
    /// Reached the depth threshold faster than the speed standard
    Skimmer,
    /// Left before reaching the depth threshold
    Bouncer,
}

impl ReaderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReaderType::Reader => "reader",
            ReaderType::Skimmer => "skimmer",
            ReaderType::Bouncer => "bouncer",
        }
    }
}

/// What caused the classification to be published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A sample's depth ratio exceeded the configured threshold
    ReachThreshold,
    /// The page was hidden for good or unloaded
    Exit,
}

/// The single record published per page view.
///
/// Field names match the data-layer payload consumed by tag managers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRecord {
    /// Configured event name
    pub event: String,
    /// Engagement label
    pub reader_type: ReaderType,
    /// Average scroll speed in pixels per second (truncated)
    pub reader_value: u64,
    /// Deepest point reached, as a rounded percentage of document height.
    ///
    /// Written as an integer string; numbers are accepted when reading back.
    #[serde(with = "percent_string")]
    pub max_scroll_depth: u32,
}

mod percent_string {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        struct PercentVisitor;

        impl<'de> Visitor<'de> for PercentVisitor {
            type Value = u32;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a percentage as an integer or integer string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
                u32::try_from(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
                u32::try_from(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
                v.trim().parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(PercentVisitor)
    }
}

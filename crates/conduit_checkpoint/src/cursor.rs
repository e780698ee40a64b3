//! Cursor configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a resource is resumed between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStrategy {
    /// Resume from the newest timestamp seen.
    FindByTimestamp,
    /// Resume from an opaque cursor reported by the connector.
    FindByCursor,
    /// Resume from the largest identifier seen.
    FindById,
    /// Always fetch everything.
    FindAll,
}

impl CursorStrategy {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorStrategy::FindByTimestamp => "find_by_timestamp",
            CursorStrategy::FindByCursor => "find_by_cursor",
            CursorStrategy::FindById => "find_by_id",
            CursorStrategy::FindAll => "find_all",
        }
    }

    /// Returns true if resume values of this strategy are ordered.
    pub fn is_ordered(&self) -> bool {
        matches!(self, CursorStrategy::FindByTimestamp | CursorStrategy::FindById)
    }
}

impl fmt::Display for CursorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown strategy or format name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value}")]
pub struct UnknownVariant {
    what: &'static str,
    value: String,
}

impl FromStr for CursorStrategy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "find_by_timestamp" => Ok(CursorStrategy::FindByTimestamp),
            "find_by_cursor" => Ok(CursorStrategy::FindByCursor),
            "find_by_id" => Ok(CursorStrategy::FindById),
            "find_all" => Ok(CursorStrategy::FindAll),
            other => Err(UnknownVariant {
                what: "cursor strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// Wire encoding of timestamp resume values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// RFC 3339 with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
    #[default]
    Iso,
    /// Integer milliseconds since the epoch.
    EpochMs,
    /// Integer seconds since the epoch, floored.
    EpochS,
    /// `YYYY-MM-DD`.
    Date,
}

impl FromStr for TimestampFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iso" => Ok(TimestampFormat::Iso),
            "epoch_ms" => Ok(TimestampFormat::EpochMs),
            "epoch_s" => Ok(TimestampFormat::EpochS),
            "date" => Ok(TimestampFormat::Date),
            other => Err(UnknownVariant {
                what: "timestamp format",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-resource cursor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Record field holding the resume value, possibly a dotted path.
    pub field: String,
    /// Resume strategy.
    pub strategy: CursorStrategy,
    /// Encoding for timestamp values.
    #[serde(default)]
    pub format: TimestampFormat,
    /// Parameter name the connector expects the value under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_param: Option<String>,
}

impl CursorConfig {
    /// Creates a configuration.
    pub fn new(field: impl Into<String>, strategy: CursorStrategy) -> Self {
        Self {
            field: field.into(),
            strategy,
            format: TimestampFormat::default(),
            action_param: None,
        }
    }

    /// Timestamp cursor on `field`.
    pub fn timestamp(field: impl Into<String>, format: TimestampFormat) -> Self {
        Self::new(field, CursorStrategy::FindByTimestamp).with_format(format)
    }

    /// Sets the timestamp format.
    #[must_use]
    pub fn with_format(mut self, format: TimestampFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the parameter name used to pass the resume value.
    #[must_use]
    pub fn with_action_param(mut self, param: impl Into<String>) -> Self {
        self.action_param = Some(param.into());
        self
    }

    /// Parameter name for the resume value, defaulting to `field`.
    pub fn action_param(&self) -> &str {
        self.action_param.as_deref().unwrap_or(&self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_round_trip() {
        for strategy in [
            CursorStrategy::FindByTimestamp,
            CursorStrategy::FindByCursor,
            CursorStrategy::FindById,
            CursorStrategy::FindAll,
        ] {
            assert_eq!(strategy.as_str().parse::<CursorStrategy>(), Ok(strategy));
            assert_eq!(
                serde_json::to_value(strategy).unwrap(),
                serde_json::Value::String(strategy.to_string())
            );
        }
        assert!("find_latest".parse::<CursorStrategy>().is_err());
    }

    #[test]
    fn action_param_defaults_to_field() {
        let config = CursorConfig::timestamp("updated_at", TimestampFormat::Iso);
        assert_eq!(config.action_param(), "updated_at");

        let config = config.with_action_param("updated_at_min");
        assert_eq!(config.action_param(), "updated_at_min");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: CursorConfig =
            serde_json::from_str(r#"{"field":"id","strategy":"find_by_id"}"#).unwrap();
        assert_eq!(config.format, TimestampFormat::Iso);
        assert_eq!(config.action_param, None);
        assert_eq!("epoch_s".parse::<TimestampFormat>(), Ok(TimestampFormat::EpochS));
    }
}

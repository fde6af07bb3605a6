use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default baud rate for serial lines.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default delay between polls of an idle serial line.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(100);

/// Close waits this many polling intervals for the reception thread by default.
const CLOSE_TIMEOUT_INTERVALS: u32 = 4;

/// How packets are delimited on the serial line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum FramingScheme {
    /// COBS byte stuffing with a `0x00` delimiter on both ends of each frame.
    #[default]
    Cobs,
}

/// Configuration for a [`crate::SerialCobsComIF`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Interface identifier.
    pub id: String,
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub port: PathBuf,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Delay between polls when the line is idle. Also bounds close latency.
    #[serde(
        default = "default_polling_interval",
        rename = "polling_interval_ms",
        with = "duration_ms"
    )]
    pub polling_interval: Duration,
    /// How long `close` waits for the reception thread. Defaults to four polling intervals.
    #[serde(default, rename = "close_timeout_ms", with = "opt_duration_ms")]
    pub close_timeout: Option<Duration>,
    #[serde(default)]
    pub framing: FramingScheme,
    /// Drop pending frames whose encoded body exceeds this many bytes.
    #[serde(default)]
    pub max_frame_size: Option<usize>,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_polling_interval() -> Duration {
    DEFAULT_POLLING_INTERVAL
}

impl SerialConfig {
    pub fn new(id: impl Into<String>, port: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            close_timeout: None,
            framing: FramingScheme::default(),
            max_frame_size: None,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_polling_interval(mut self, polling_interval: Duration) -> Self {
        self.polling_interval = polling_interval;
        self
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = Some(close_timeout);
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = Some(max_frame_size);
        self
    }

    /// Bounded wait applied when joining the reception thread.
    pub fn effective_close_timeout(&self) -> Duration {
        self.close_timeout
            .unwrap_or(self.polling_interval * CLOSE_TIMEOUT_INTERVALS)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ConfigError::Invalid("id must not be empty".to_string()));
        }
        if self.polling_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "polling interval must be greater than zero".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_size == Some(0) {
            return Err(ConfigError::Invalid(
                "max frame size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SerialConfig::new("ser", "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(cfg.polling_interval, Duration::from_millis(100));
        assert_eq!(cfg.effective_close_timeout(), Duration::from_millis(400));
        assert_eq!(cfg.framing, FramingScheme::Cobs);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn explicit_close_timeout_wins() {
        let cfg = SerialConfig::new("ser", "/dev/ttyS0")
            .with_polling_interval(Duration::from_millis(20))
            .with_close_timeout(Duration::from_secs(1));
        assert_eq!(cfg.effective_close_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn parses_minimal_json() {
        let cfg = SerialConfig::from_json_str(r#"{"id": "obc", "port": "/dev/ttyACM0"}"#).unwrap();
        assert_eq!(cfg, SerialConfig::new("obc", "/dev/ttyACM0"));
    }

    #[test]
    fn parses_full_json() {
        let cfg = SerialConfig::from_json_str(
            r#"{
                "id": "obc",
                "port": "/dev/ttyACM0",
                "baud_rate": 9600,
                "polling_interval_ms": 25,
                "close_timeout_ms": 200,
                "framing": "cobs",
                "max_frame_size": 2048
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.polling_interval, Duration::from_millis(25));
        assert_eq!(cfg.close_timeout, Some(Duration::from_millis(200)));
        assert_eq!(cfg.max_frame_size, Some(2048));
    }

    #[test]
    fn json_round_trip_keeps_millis() {
        let cfg = SerialConfig::new("obc", "/dev/ttyACM0")
            .with_polling_interval(Duration::from_millis(50))
            .with_close_timeout(Duration::from_millis(300));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"polling_interval_ms\":50"));
        assert_eq!(SerialConfig::from_json_str(&json).unwrap(), cfg);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = SerialConfig::from_json_str(
            r#"{"id": "obc", "port": "/dev/ttyACM0", "polling_interval_ms": 0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SerialConfig::from_json_str(r#"{"id": "", "port": "/dev/tty"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SerialConfig::from_json_str(r#"{"id": "obc"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SerialConfig::from_json_file("/nonexistent/comif.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

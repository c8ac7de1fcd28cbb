//! Dialog tracker configuration
//!
//! ```
//! use std::time::Duration;
//! use rvoip_dialog_tracker::config::DialogConfig;
//! use rvoip_dialog_tracker::routing::MatchMode;
//!
//! let config = DialogConfig::default()
//!     .with_hash_size(1024)
//!     .with_default_timeout(3600)
//!     .with_match_mode(MatchMode::StrictId)
//!     .with_timer_tick_interval(Duration::from_millis(500));
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{DialogError, DialogResult};
use crate::persistence::PersistenceMode;
use crate::routing::MatchMode;

/// Default dialog lifetime, 12 hours
pub const DEFAULT_TIMEOUT_SECS: u32 = 12 * 60 * 60;

/// Configuration of the dialog tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Number of table buckets, rounded up to a power of two
    pub hash_size: u32,

    /// Name of the Record-Route parameter carrying the dialog identity
    pub rr_param: String,

    /// Dialog lifetime in seconds once confirmed
    pub default_timeout: u32,

    /// Seconds a dialog may stay in early state before it expires
    pub no_answer_timeout: u32,

    /// How in-dialog requests are matched
    pub match_mode: MatchMode,

    /// Reuse the existing dialog when an initial request spirals back
    pub detect_spirals: bool,

    /// Send BYE to both legs when a confirmed dialog expires
    pub bye_on_timeout: bool,

    /// When dialogs are handed to the persistence hook
    pub persistence_mode: PersistenceMode,

    /// Interval between delayed persistence flushes
    #[serde(with = "duration_secs")]
    pub persistence_flush_interval: Duration,

    /// Interval between timer wheel ticks
    #[serde(with = "duration_millis")]
    pub timer_tick_interval: Duration,

    /// Interval between stale dialog sweeps
    #[serde(with = "duration_secs")]
    pub stale_cleanup_interval: Duration,

    /// Unconfirmed dialogs older than this are destroyed by the sweep
    pub unconfirmed_max_age: u32,

    /// Dialogs waiting for ACK longer than this get a short grace period
    pub confirmed_na_max_age: u32,

    /// Lifetime left to dialogs that never saw their ACK
    pub confirmed_na_grace: u32,

    /// Profiles keyed by value
    pub profiles_with_value: Vec<String>,

    /// Profiles without value
    pub profiles_no_value: Vec<String>,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            hash_size: 4096,
            rr_param: "did".to_string(),
            default_timeout: DEFAULT_TIMEOUT_SECS,
            no_answer_timeout: 180,
            match_mode: MatchMode::IdWithFallback,
            detect_spirals: true,
            bye_on_timeout: true,
            persistence_mode: PersistenceMode::None,
            persistence_flush_interval: Duration::from_secs(60),
            timer_tick_interval: Duration::from_secs(1),
            stale_cleanup_interval: Duration::from_secs(90),
            unconfirmed_max_age: 300,
            confirmed_na_max_age: 60,
            confirmed_na_grace: 10,
            profiles_with_value: Vec::new(),
            profiles_no_value: Vec::new(),
        }
    }
}

impl DialogConfig {
    /// Load from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> DialogResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_hash_size(mut self, size: u32) -> Self {
        self.hash_size = size;
        self
    }

    pub fn with_rr_param(mut self, name: impl Into<String>) -> Self {
        self.rr_param = name.into();
        self
    }

    pub fn with_default_timeout(mut self, secs: u32) -> Self {
        self.default_timeout = secs;
        self
    }

    pub fn with_no_answer_timeout(mut self, secs: u32) -> Self {
        self.no_answer_timeout = secs;
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn without_spiral_detection(mut self) -> Self {
        self.detect_spirals = false;
        self
    }

    pub fn without_bye_on_timeout(mut self) -> Self {
        self.bye_on_timeout = false;
        self
    }

    pub fn with_persistence_mode(mut self, mode: PersistenceMode) -> Self {
        self.persistence_mode = mode;
        self
    }

    pub fn with_timer_tick_interval(mut self, interval: Duration) -> Self {
        self.timer_tick_interval = interval;
        self
    }

    pub fn with_stale_cleanup_interval(mut self, interval: Duration) -> Self {
        self.stale_cleanup_interval = interval;
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>, with_value: bool) -> Self {
        if with_value {
            self.profiles_with_value.push(name.into());
        } else {
            self.profiles_no_value.push(name.into());
        }
        self
    }

    /// Bucket count actually used by the table
    pub fn effective_hash_size(&self) -> u32 {
        self.hash_size.max(1).checked_next_power_of_two().unwrap_or(1 << 31)
    }

    /// Validate the configuration
    pub fn validate(&self) -> DialogResult<()> {
        if self.hash_size == 0 {
            return Err(DialogError::config("hash_size must be greater than 0"));
        }
        if self.rr_param.is_empty() || self.rr_param.contains(|c: char| c.is_whitespace() || c == ';' || c == '=') {
            return Err(DialogError::config(format!("rr_param '{}' is not a valid parameter name", self.rr_param)));
        }
        if self.default_timeout == 0 {
            return Err(DialogError::config("default_timeout must be greater than 0"));
        }
        if self.no_answer_timeout == 0 {
            return Err(DialogError::config("no_answer_timeout must be greater than 0"));
        }
        if self.timer_tick_interval.is_zero() {
            return Err(DialogError::config("timer_tick_interval must be greater than 0"));
        }
        if self.stale_cleanup_interval.is_zero() || self.persistence_flush_interval.is_zero() {
            return Err(DialogError::config("cleanup and flush intervals must be greater than 0"));
        }
        if let Some(name) = self
            .profiles_with_value
            .iter()
            .find(|name| self.profiles_no_value.contains(name))
        {
            return Err(DialogError::config(format!("profile '{}' declared twice", name)));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the replication protocol.
//!
//! [`ReplicaConfig`] is passed to
//! [`ReplicaStore::builder()`](crate::replica::ReplicaStore::builder). The
//! origin-side handshake helpers take a [`HandshakeConfig`] directly. Both can
//! be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use state_replication::config::{ObserverInit, ReplicaConfig};
//!
//! let config = ReplicaConfig {
//!     sync_initial_state: true,
//!     observer: ObserverInit::Enabled(true),
//!     ..Default::default()
//! };
//! assert_eq!(config.handshake.timeout_duration().as_secs(), 60);
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicaConfig
//! ├── sync_initial_state: bool     # push local state to origin on build
//! ├── observer: ObserverInit       # false | true | { name, include_state }
//! └── handshake: HandshakeConfig
//!     └── timeout: String          # humantime deadline per handshake wait
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! sync_initial_state: false
//! observer:
//!   name: "counter-replica"
//!   include_state: true
//! handshake:
//!   timeout: "60s"
//! ```

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicaConfig: top-level replica settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Replica store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Push the locally supplied initial state to origin on construction.
    ///
    /// When `false`, a locally supplied state is used as-is and nothing is
    /// sent; without one, [`resolve()`](crate::replica::ReplicaBuilder::resolve)
    /// pulls it from origin.
    #[serde(default = "default_false")]
    pub sync_initial_state: bool,

    /// Debugging observer hookup.
    #[serde(default)]
    pub observer: ObserverInit,

    /// Handshake deadline.
    #[serde(default)]
    pub handshake: HandshakeConfig,
}

impl ReplicaConfig {
    /// Short deadlines for tests.
    pub fn for_testing() -> Self {
        Self {
            sync_initial_state: false,
            observer: ObserverInit::Enabled(false),
            handshake: HandshakeConfig::for_testing(),
        }
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        self.handshake.validate()
    }
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// ObserverInit: debugging observer settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Observer setting: a plain switch or a full option set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObserverInit {
    /// `true` connects with default options; `false` disables the observer.
    Enabled(bool),
    /// Connect with these options.
    Options(ObserverOptions),
}

impl Default for ObserverInit {
    fn default() -> Self {
        ObserverInit::Enabled(false)
    }
}

impl ObserverInit {
    /// Options to connect with, or `None` when disabled.
    pub fn options(&self) -> Option<ObserverOptions> {
        match self {
            ObserverInit::Enabled(true) => Some(ObserverOptions::default()),
            ObserverInit::Enabled(false) => None,
            ObserverInit::Options(options) => Some(options.clone()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, ObserverInit::Enabled(false))
    }
}

/// Options handed to an [`ObserverConnector`](crate::replica::ObserverConnector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverOptions {
    /// Instance name shown by the observer.
    #[serde(default)]
    pub name: Option<String>,

    /// Forward full state snapshots, not just actions.
    #[serde(default = "default_true")]
    pub include_state: bool,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            name: None,
            include_state: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HandshakeConfig: deadlines for handshake waits
// ═══════════════════════════════════════════════════════════════════════════════

/// Handshake deadline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Deadline as a duration string (e.g., "60s", "1500ms").
    /// Parsed to Duration internally.
    #[serde(default = "default_handshake_timeout")]
    pub timeout: String,
}

fn default_handshake_timeout() -> String {
    "60s".to_string()
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: default_handshake_timeout(),
        }
    }
}

impl HandshakeConfig {
    /// Short deadline for tests.
    pub fn for_testing() -> Self {
        Self {
            timeout: "500ms".to_string(),
        }
    }

    /// Config with an explicit deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: humantime::format_duration(timeout).to_string(),
        }
    }

    /// Parse the timeout string to a Duration, falling back to 60 seconds.
    pub fn timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.timeout).unwrap_or(Duration::from_secs(60))
    }

    /// Fail on an unparseable or zero deadline.
    pub fn validate(&self) -> Result<()> {
        match humantime::parse_duration(&self.timeout) {
            Ok(d) if d.is_zero() => Err(ProtocolError::Config(
                "handshake.timeout must be greater than zero".to_string(),
            )),
            Ok(_) => Ok(()),
            Err(e) => Err(ProtocolError::Config(format!(
                "invalid handshake.timeout '{}': {}",
                self.timeout, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_config_defaults() {
        let config = ReplicaConfig::default();
        assert!(!config.sync_initial_state);
        assert_eq!(config.observer, ObserverInit::Enabled(false));
        assert_eq!(config.handshake.timeout, "60s");
        assert_eq!(config.handshake.timeout_duration(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_testing_has_short_deadline() {
        let config = ReplicaConfig::for_testing();
        assert_eq!(config.handshake.timeout_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_handshake_timeout_various_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("1500ms", Duration::from_millis(1500)),
            ("2min", Duration::from_secs(120)),
        ];

        for (input, expected) in test_cases {
            let config = HandshakeConfig {
                timeout: input.to_string(),
            };
            assert_eq!(config.timeout_duration(), expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_handshake_timeout_invalid_fallback() {
        let config = HandshakeConfig {
            timeout: "invalid".to_string(),
        };
        // Should fall back to 60 seconds
        assert_eq!(config.timeout_duration(), Duration::from_secs(60));
        assert!(matches!(config.validate(), Err(ProtocolError::Config(_))));
    }

    #[test]
    fn test_handshake_zero_timeout_rejected() {
        let config = HandshakeConfig {
            timeout: "0s".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_timeout_roundtrips() {
        let config = HandshakeConfig::with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: ReplicaConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReplicaConfig::default());
    }

    #[test]
    fn test_deserialize_observer_bool() {
        let config: ReplicaConfig = serde_json::from_str(r#"{"observer": true}"#).unwrap();
        assert_eq!(config.observer, ObserverInit::Enabled(true));
        assert_eq!(config.observer.options(), Some(ObserverOptions::default()));
    }

    #[test]
    fn test_deserialize_observer_options() {
        let config: ReplicaConfig = serde_json::from_str(
            r#"{"sync_initial_state": true, "observer": {"name": "counter"}, "handshake": {"timeout": "2s"}}"#,
        )
        .unwrap();
        assert!(config.sync_initial_state);
        assert!(config.observer.is_enabled());
        let options = config.observer.options().unwrap();
        assert_eq!(options.name.as_deref(), Some("counter"));
        assert!(options.include_state);
        assert_eq!(config.handshake.timeout_duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_observer_disabled_has_no_options() {
        assert!(!ObserverInit::Enabled(false).is_enabled());
        assert_eq!(ObserverInit::Enabled(false).options(), None);
    }
}

use crate::auth::fixation::FixationPolicy;
use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

fn default_max_sessions() -> i32 {
    -1
}

/// Configuration surface consumed by the session-control core.
///
/// Every field has a serde default so a partial YAML document (or an
/// empty one) yields a working configuration: unlimited sessions, evict
/// rather than reject, in-place session-id rotation, no recovery URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionControlConfig {
    /// Maximum concurrent sessions per principal; `-1` means unlimited.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: i32,
    /// When the quota is reached, reject the new login instead of
    /// expiring the least recently used session.
    #[serde(default)]
    pub max_sessions_prevents_login: bool,
    /// How the session identifier is handled at authentication time.
    #[serde(default)]
    pub fixation_protection: FixationPolicy,
    /// Where to send a request bearing an unrecognized session id. The
    /// invalid-session check only runs when this is set.
    #[serde(default)]
    pub invalid_session_url: Option<String>,
    /// Where to send an interactive request whose session was expired by
    /// the concurrency limiter. Non-interactive requests (and
    /// deployments without a URL) get an unauthorized outcome instead.
    #[serde(default)]
    pub expired_session_url: Option<String>,
    /// Attribute names carried across a `new_session` rotation. All other
    /// attributes are discarded by that policy.
    #[serde(default)]
    pub reserved_attributes: Vec<String>,
}

impl Default for SessionControlConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_sessions_prevents_login: false,
            fixation_protection: FixationPolicy::default(),
            invalid_session_url: None,
            expired_session_url: None,
            reserved_attributes: Vec::new(),
        }
    }
}

impl SessionControlConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.max_sessions < -1 || self.max_sessions == 0 {
            return Err(SessionError::InvalidConfig(format!(
                "max_sessions must be -1 (unlimited) or a positive integer, got {}",
                self.max_sessions
            )));
        }
        Ok(())
    }
}

/// Load configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SessionControlConfig, SessionError> {
    let path = path.as_ref();
    info!("Loading session-control configuration from: {}", path.display());

    let contents = fs::read_to_string(path).map_err(|e| {
        SessionError::ConfigLoad(format!(
            "failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: SessionControlConfig = serde_yaml::from_str(&contents)
        .map_err(|e| SessionError::ConfigLoad(format!("failed to parse YAML config: {}", e)))?;

    config.validate()?;

    info!(
        "Session-control configuration loaded: max_sessions={}, prevents_login={}, fixation={:?}",
        config.max_sessions, config.max_sessions_prevents_login, config.fixation_protection
    );

    Ok(config)
}

/// Load configuration with fallback options: the `SESSION_CONTROL_CONFIG`
/// environment variable first, then common file locations, then built-in
/// defaults.
pub fn load_config_with_fallback() -> SessionControlConfig {
    if let Ok(config_path) = std::env::var("SESSION_CONTROL_CONFIG") {
        match load_config(&config_path) {
            Ok(config) => return config,
            Err(e) => warn!(
                "Failed to load config from SESSION_CONTROL_CONFIG ({}): {}",
                config_path, e
            ),
        }
    }

    for path in ["session-control.yaml", "session-control.yml"] {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return config,
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    info!("No session-control configuration file found, using defaults");
    SessionControlConfig::default()
}

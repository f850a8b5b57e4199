// src/config.rs - Engine configuration with environment and file overrides

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use rust_decimal::Decimal;

/// Tunable policy values for the risk engine
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum facial similarity to count the factor as passed
    pub face_match_threshold: f64,
    /// Minimum keystroke similarity to count the factor as passed
    pub typing_match_threshold: f64,
    /// Location factor passes while its risk stays below this
    pub location_risk_threshold: f64,
    /// Device factor passes while its risk stays below this
    pub device_risk_threshold: f64,
    /// Risk assigned to a login from a trusted device
    pub trusted_device_risk: f64,
    /// Risk assigned to a login from an unrecognized device
    pub untrusted_device_risk: f64,
    /// Risk assigned to a login from a previously seen location
    pub known_location_risk: f64,
    /// Risk assigned to a login from a never-seen location
    pub unknown_location_risk: f64,
    /// Start of the unusual-hours window (inclusive, hour of day)
    pub unusual_hours_start: u32,
    /// End of the unusual-hours window (inclusive, hour of day)
    pub unusual_hours_end: u32,
    /// Lifetime of an out-of-band challenge token, in seconds
    pub challenge_validity_secs: i64,
    /// Transfers above this amount add a risk penalty
    pub suspicious_transaction_threshold: Decimal,
    /// Transfers above this amount are screened for suspicion
    pub large_transaction_threshold: Decimal,
    /// Overshoot ratio at which a large transfer is flagged
    pub transaction_suspicion_ratio: f64,
    /// Failed logins in a burst before it reads as brute force
    pub max_login_attempts: u32,
    /// Reserved: automatic threat-level decay (off by default)
    pub threat_decay_enabled: bool,
    /// Optional JSON snapshot path for the user store
    pub data_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            face_match_threshold: 0.8,
            typing_match_threshold: 0.75,
            location_risk_threshold: 0.4,
            device_risk_threshold: 0.5,
            trusted_device_risk: 0.2,
            untrusted_device_risk: 0.65,
            known_location_risk: 0.1,
            unknown_location_risk: 0.6,
            unusual_hours_start: 2,
            unusual_hours_end: 5,
            challenge_validity_secs: 300,
            suspicious_transaction_threshold: Decimal::new(5000, 0),
            large_transaction_threshold: Decimal::new(10000, 0),
            transaction_suspicion_ratio: 0.3,
            max_login_attempts: 5,
            threat_decay_enabled: false,
            data_file: None,
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration from defaults, then an optional file, then environment
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    if let Ok(path) = env::var("CONFIG_FILE") {
        let path = PathBuf::from(path);
        if path.exists() {
            load_from_file(&mut config, &path)?;
        }
    }

    load_from_env(&mut config);
    debug!("Configuration loaded: {:?}", config);

    Ok(config)
}

/// Apply environment variable overrides
fn load_from_env(config: &mut Config) {
    if let Ok(value) = env::var("FACE_MATCH_THRESHOLD") {
        if let Ok(value) = value.parse() {
            config.face_match_threshold = value;
        }
    }

    if let Ok(value) = env::var("TYPING_MATCH_THRESHOLD") {
        if let Ok(value) = value.parse() {
            config.typing_match_threshold = value;
        }
    }

    if let Ok(value) = env::var("UNTRUSTED_DEVICE_RISK") {
        if let Ok(value) = value.parse() {
            config.untrusted_device_risk = value;
        }
    }

    if let Ok(value) = env::var("UNUSUAL_HOURS_START") {
        if let Ok(value) = value.parse() {
            config.unusual_hours_start = value;
        }
    }

    if let Ok(value) = env::var("UNUSUAL_HOURS_END") {
        if let Ok(value) = value.parse() {
            config.unusual_hours_end = value;
        }
    }

    if let Ok(value) = env::var("CHALLENGE_VALIDITY_SECS") {
        if let Ok(value) = value.parse() {
            config.challenge_validity_secs = value;
        }
    }

    if let Ok(value) = env::var("SUSPICIOUS_TRANSACTION_THRESHOLD") {
        if let Ok(value) = value.parse() {
            config.suspicious_transaction_threshold = value;
        }
    }

    if let Ok(value) = env::var("LARGE_TRANSACTION_THRESHOLD") {
        if let Ok(value) = value.parse() {
            config.large_transaction_threshold = value;
        }
    }

    if let Ok(value) = env::var("TRANSACTION_SUSPICION_RATIO") {
        if let Ok(value) = value.parse() {
            config.transaction_suspicion_ratio = value;
        }
    }

    if let Ok(value) = env::var("THREAT_DECAY_ENABLED") {
        config.threat_decay_enabled = value == "1" || value.eq_ignore_ascii_case("true");
    }

    if let Ok(path) = env::var("DATA_FILE") {
        config.data_file = Some(PathBuf::from(path));
    }

    if let Ok(level) = env::var("LOG_LEVEL") {
        config.log_level = level;
    }
}

/// Load configuration from a key=value file
fn load_from_file(config: &mut Config, path: &Path) -> Result<()> {
    let file = File::open(path).context("Failed to open configuration file")?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line.context("Failed to read line from configuration file")?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(index) = line.find('=') {
            let key = line[..index].trim();
            let value = line[index + 1..].trim();

            match key {
                "FACE_MATCH_THRESHOLD" => {
                    if let Ok(value) = value.parse() {
                        config.face_match_threshold = value;
                    }
                }
                "TYPING_MATCH_THRESHOLD" => {
                    if let Ok(value) = value.parse() {
                        config.typing_match_threshold = value;
                    }
                }
                "LOCATION_RISK_THRESHOLD" => {
                    if let Ok(value) = value.parse() {
                        config.location_risk_threshold = value;
                    }
                }
                "DEVICE_RISK_THRESHOLD" => {
                    if let Ok(value) = value.parse() {
                        config.device_risk_threshold = value;
                    }
                }
                "UNTRUSTED_DEVICE_RISK" => {
                    if let Ok(value) = value.parse() {
                        config.untrusted_device_risk = value;
                    }
                }
                "UNUSUAL_HOURS_START" => {
                    if let Ok(value) = value.parse() {
                        config.unusual_hours_start = value;
                    }
                }
                "UNUSUAL_HOURS_END" => {
                    if let Ok(value) = value.parse() {
                        config.unusual_hours_end = value;
                    }
                }
                "CHALLENGE_VALIDITY_SECS" => {
                    if let Ok(value) = value.parse() {
                        config.challenge_validity_secs = value;
                    }
                }
                "SUSPICIOUS_TRANSACTION_THRESHOLD" => {
                    if let Ok(value) = value.parse() {
                        config.suspicious_transaction_threshold = value;
                    }
                }
                "LARGE_TRANSACTION_THRESHOLD" => {
                    if let Ok(value) = value.parse() {
                        config.large_transaction_threshold = value;
                    }
                }
                "TRANSACTION_SUSPICION_RATIO" => {
                    if let Ok(value) = value.parse() {
                        config.transaction_suspicion_ratio = value;
                    }
                }
                "THREAT_DECAY_ENABLED" => {
                    config.threat_decay_enabled =
                        value == "1" || value.eq_ignore_ascii_case("true");
                }
                "DATA_FILE" => config.data_file = Some(PathBuf::from(value)),
                "LOG_LEVEL" => config.log_level = value.to_string(),
                _ => {}
            }
        }
    }

    Ok(())
}

// src/config.rs
//! Persisted recorder configuration

use crate::{
    error::{RecorderError, Result},
    gps::{data::Coordinate, sampler::SamplingPolicy},
    session::PausePolicy,
    track::SampleFilter,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_API_BASE_URL: &str = "https://api.portable-fitness-detector.shop/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub source_type: String, // "gpsd", "serial", "replay"
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
    pub replay_file: Option<PathBuf>,
    pub replay_speedup: Option<f64>,
    pub sampling: SamplingPolicy,
    pub filter: SampleFilter,
    pub pause_policy: PausePolicy,
    pub fix_timeout_secs: u64,
    /// Map center when no fix is available
    pub fallback_center: Coordinate,
    pub api_base_url: String,
    pub api_token: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: Some(9600),
            gpsd_host: Some("localhost".to_string()),
            gpsd_port: Some(2947),
            replay_file: None,
            replay_speedup: Some(1.0),
            sampling: SamplingPolicy::default(),
            filter: SampleFilter::default(),
            pause_policy: PausePolicy::default(),
            fix_timeout_secs: 10,
            fallback_center: Coordinate::new(-7.797068, 110.370529),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
        }
    }
}

impl RecorderConfig {
    /// Load configuration, falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            log::debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| RecorderError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| RecorderError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RecorderError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)
            .map_err(|e| RecorderError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {}", config_path.display());
        Ok(config_path)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| RecorderError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("activity-recorder")
            .join("config.json"))
    }

    pub fn update_source(&mut self, source_type: &str) {
        self.source_type = source_type.to_string();
    }

    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        self.serial_baudrate = Some(baudrate);
    }

    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = Some(host);
        self.gpsd_port = Some(port);
    }

    pub fn update_replay(&mut self, file: PathBuf, speedup: f64) {
        self.source_type = "replay".to_string();
        self.replay_file = Some(file);
        self.replay_speedup = Some(speedup);
    }
}

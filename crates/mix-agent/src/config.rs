//! Show configuration: JSON config file, environment and .env handling.

use std::path::Path;

use serde::Deserialize;

use crate::approval::ApprovalMode;

/// The on-disk show config. Every key is optional; defaults match a
/// typical small-venue X32 setup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    pub console_type: String,
    pub console_ip: String,
    /// 0 selects the protocol default for the console type
    pub console_port: u16,
    pub approval_mode: String,

    pub dsp_interval_ms: u64,
    pub llm_interval_ms: u64,
    pub meter_refresh_ms: u32,
    pub snapshot_interval_ms: u64,

    pub headless: bool,
    pub ollama_primary: bool,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,

    pub genre: String,
    pub preferences_file: String,
    pub prompt_dir: String,

    pub audio_device_id: i32,
    /// 0 disables audio capture
    pub audio_channels: u16,
    pub audio_sample_rate: f64,
    pub audio_fft_size: usize,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            console_type: "x32".into(),
            console_ip: "192.168.1.100".into(),
            console_port: 0,
            approval_mode: "auto_urgent".into(),
            dsp_interval_ms: 50,
            llm_interval_ms: 5000,
            meter_refresh_ms: 50,
            snapshot_interval_ms: 60_000,
            headless: false,
            ollama_primary: false,
            llm_temperature: 0.3,
            llm_max_tokens: 1024,
            genre: String::new(),
            preferences_file: String::new(),
            prompt_dir: String::new(),
            audio_device_id: -1,
            audio_channels: 0,
            audio_sample_rate: 48_000.0,
            audio_fft_size: 1024,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ShowConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        match self.approval_mode.as_str() {
            "approve_all" => ApprovalMode::ApproveAll,
            "auto_all" => ApprovalMode::AutoAll,
            "deny_all" => ApprovalMode::DenyAll,
            _ => ApprovalMode::AutoUrgent,
        }
    }
}

/// Load KEY=VALUE lines from a .env file without overriding variables
/// that are already set. Lines starting with '#' are comments; values
/// may be double-quoted.
pub fn load_dotenv(path: &Path) {
    let Ok(body) = std::fs::read_to_string(path) else {
        return;
    };
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let mut value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }
}

/// Read an env var with a fallback.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShowConfig::default();
        assert_eq!(config.console_type, "x32");
        assert_eq!(config.dsp_interval_ms, 50);
        assert_eq!(config.llm_interval_ms, 5000);
        assert_eq!(config.snapshot_interval_ms, 60_000);
        assert_eq!(config.approval_mode(), ApprovalMode::AutoUrgent);
        assert_eq!(config.audio_channels, 0);
    }

    #[test]
    fn test_partial_config_parses() {
        let config: ShowConfig =
            serde_json::from_str(r#"{"console_type": "wing", "console_ip": "10.0.0.5"}"#).unwrap();
        assert_eq!(config.console_type, "wing");
        assert_eq!(config.console_ip, "10.0.0.5");
        assert_eq!(config.console_port, 0);
        assert_eq!(config.llm_max_tokens, 1024);
    }

    #[test]
    fn test_approval_mode_strings() {
        for (s, mode) in [
            ("approve_all", ApprovalMode::ApproveAll),
            ("auto_urgent", ApprovalMode::AutoUrgent),
            ("auto_all", ApprovalMode::AutoAll),
            ("deny_all", ApprovalMode::DenyAll),
            ("something_else", ApprovalMode::AutoUrgent),
        ] {
            let config = ShowConfig { approval_mode: s.into(), ..ShowConfig::default() };
            assert_eq!(config.approval_mode(), mode);
        }
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(ShowConfig::load(Path::new("/nonexistent/show.json")).is_err());
    }

    #[test]
    fn test_dotenv_no_override() {
        let path = std::env::temp_dir().join("mixagent_dotenv_test");
        std::fs::write(
            &path,
            "# comment\nMIXAGENT_TEST_A=from_file\nMIXAGENT_TEST_B=\"quoted value\"\nbroken line\n",
        )
        .unwrap();

        std::env::set_var("MIXAGENT_TEST_A", "from_env");
        std::env::remove_var("MIXAGENT_TEST_B");
        load_dotenv(&path);

        assert_eq!(std::env::var("MIXAGENT_TEST_A").unwrap(), "from_env");
        assert_eq!(std::env::var("MIXAGENT_TEST_B").unwrap(), "quoted value");

        std::fs::remove_file(&path).unwrap();
        std::env::remove_var("MIXAGENT_TEST_A");
        std::env::remove_var("MIXAGENT_TEST_B");
    }

    #[test]
    fn test_env_or_fallback() {
        std::env::remove_var("MIXAGENT_TEST_MISSING");
        assert_eq!(env_or("MIXAGENT_TEST_MISSING", "fallback"), "fallback");
    }
}

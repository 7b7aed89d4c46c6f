use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::decode::DecodeSettings;
use crate::error::{Error, Result};
use crate::session::InMemorySessionStore;
use crate::transcode::FfmpegTranscoder;

const CONFIG_FILE: &str = "musicmatch.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
pub struct DecodeConfig {
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f32,
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: f32,
    #[serde(default = "default_min_input_bytes")]
    pub min_input_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_transcode_enabled")]
    pub enabled: bool,
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: default_target_sample_rate(),
            max_duration_secs: default_max_duration_secs(),
            min_duration_secs: default_min_duration_secs(),
            min_input_bytes: default_min_input_bytes(),
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: default_transcode_enabled(),
            program: default_program(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_target_sample_rate() -> u32 { 48_000 }
fn default_max_duration_secs() -> f32 { 30.0 }
fn default_min_duration_secs() -> f32 { 5.0 }
fn default_min_input_bytes() -> usize { 1000 }
fn default_transcode_enabled() -> bool { true }
fn default_program() -> PathBuf { "ffmpeg".into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_ttl_secs() -> u64 { 3600 }
fn default_max_entries() -> usize { 10_000 }
fn default_sweep_interval_secs() -> u64 { 60 }

impl Config {
    pub fn validate(&self) -> Result<()> {
        let d = &self.decode;
        if d.target_sample_rate == 0 {
            return Err(Error::Config("decode.target_sample_rate must be positive".into()));
        }
        if !(d.max_duration_secs > 0.0) || !(d.min_duration_secs >= 0.0) {
            return Err(Error::Config("decode durations must be non-negative and max > 0".into()));
        }
        if d.min_duration_secs > d.max_duration_secs {
            return Err(Error::Config(format!(
                "decode.min_duration_secs ({}) exceeds max_duration_secs ({})",
                d.min_duration_secs, d.max_duration_secs
            )));
        }
        if self.session.max_entries == 0 {
            return Err(Error::Config("session.max_entries must be positive".into()));
        }
        Ok(())
    }

    pub fn decode_settings(&self) -> DecodeSettings {
        DecodeSettings {
            target_sample_rate: self.decode.target_sample_rate,
            max_duration_secs: self.decode.max_duration_secs,
            min_duration_secs: self.decode.min_duration_secs,
            min_input_bytes: self.decode.min_input_bytes,
        }
    }

    /// `None` when external transcoding is switched off.
    pub fn transcoder(&self) -> Option<FfmpegTranscoder> {
        self.transcode.enabled.then(|| {
            FfmpegTranscoder::new(
                self.transcode.program.clone(),
                Duration::from_secs(self.transcode.timeout_secs),
            )
        })
    }

    pub fn session_store(&self) -> InMemorySessionStore {
        InMemorySessionStore::new(Duration::from_secs(self.session.ttl_secs), self.session.max_entries)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_secs.max(1))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Explicit path if given, else ./musicmatch.toml, ~/.config/musicmatch/config.toml,
/// then the platform config directory.
pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("musicmatch").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("musicmatch").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.decode_settings(), DecodeSettings::default());
        assert!(config.transcode.enabled);
        assert_eq!(config.transcode.program, PathBuf::from("ffmpeg"));
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(config.session.max_entries, 10_000);
    }

    #[test]
    fn partial_sections_fill_in() {
        let file = write_config(
            r#"
[decode]
target_sample_rate = 44100

[transcode]
enabled = false
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.decode.target_sample_rate, 44_100);
        assert_eq!(config.decode.max_duration_secs, 30.0);
        assert!(config.transcoder().is_none());
        assert_eq!(config.transcode.timeout_secs, 30);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config("[decode]\nmin_duration_secs = 40.0\n");
        assert!(matches!(load_config(file.path()), Err(Error::Config(_))));

        let file = write_config("[decode\n");
        assert!(matches!(load_config(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(&dir.path().join("nope.toml")), Err(Error::Io(_))));
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/tmp/explicit.toml");
        assert_eq!(discover_config_path(Some(path)), Some(path.to_path_buf()));
    }
}

// Profiler configuration
//
// Defaults reproduce the classic behaviour: reports in the working directory,
// one million calibration samples, per-sample correction with two read pairs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calibration::{Correction, CorrectionMode, NCALIBRATION, NCALL};
use crate::error::{ProfileError, Result};

/// Environment variable naming a TOML configuration file
pub const CONFIG_ENV: &str = "BLOCKPROF_CONFIG";
/// Environment variable overriding the report directory
pub const OUTPUT_DIR_ENV: &str = "BLOCKPROF_OUTPUT_DIR";
/// Environment variable overriding the correction mode
pub const CORRECTION_MODE_ENV: &str = "BLOCKPROF_CORRECTION_MODE";

/// Configuration for a profiling session
///
/// # Example
/// ```
/// use blockprof::ProfileConfig;
///
/// let config = ProfileConfig::from_toml_str(r#"
///     output_dir = "/tmp/profiles"
///     correction_mode = "suspect"
/// "#).unwrap();
/// assert_eq!(config.calibration_samples, 1_000_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    /// Directory receiving `profile.txt` and `profile-<N>.txt`
    pub output_dir: PathBuf,

    /// Iterations of each init-time calibration loop
    ///
    /// Each iteration reads the thread CPU clock twice. One million samples
    /// take on the order of a second.
    pub calibration_samples: u64,

    /// Read pairs used to re-estimate the clock cost on every interval
    ///
    /// Kept very small so the correction follows local jitter.
    pub correction_samples: u32,

    /// Per-sample correction or suspect flagging
    pub correction_mode: CorrectionMode,

    /// Delete reports left by a previous run when a session starts
    pub remove_stale_reports: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            calibration_samples: NCALL,
            correction_samples: NCALIBRATION,
            correction_mode: CorrectionMode::PerSample,
            remove_stale_reports: true,
        }
    }
}

impl ProfileConfig {
    /// Small calibration run for tests and short-lived tools.
    pub fn quick() -> Self {
        Self {
            calibration_samples: 10_000,
            ..Self::default()
        }
    }

    /// Same configuration writing reports to `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Configuration from the environment.
    ///
    /// Starts from the file named by `BLOCKPROF_CONFIG` (or the defaults), then
    /// applies `BLOCKPROF_OUTPUT_DIR` and `BLOCKPROF_CORRECTION_MODE`.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(dir) = std::env::var_os(OUTPUT_DIR_ENV) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = std::env::var(CORRECTION_MODE_ENV) {
            config.correction_mode = mode.parse().map_err(ProfileError::InvalidConfig)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.calibration_samples == 0 {
            return Err(ProfileError::InvalidConfig(
                "calibration_samples must be >= 1".to_string(),
            ));
        }

        if self.correction_samples == 0 {
            return Err(ProfileError::InvalidConfig(
                "correction_samples must be >= 1".to_string(),
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ProfileError::InvalidConfig(
                "output_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Per-interval correction derived from this configuration.
    pub fn correction(&self) -> Correction {
        Correction {
            mode: self.correction_mode,
            samples: self.correction_samples,
        }
    }
}

use crate::core::error::{Error, Result};
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One word substitution applied when shortening term names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Abbreviation {
    pub word: String,
    pub abbreviation: String,
}

impl Abbreviation {
    pub fn new(word: impl Into<String>, abbreviation: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            abbreviation: abbreviation.into(),
        }
    }
}

/// Generator settings shared by every render call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Weeks before expiration at which a term starts producing notices
    #[serde(default = "default_exp_info_weeks")]
    pub exp_info_weeks: u32,
    /// Substitutions tried, in order, on over-long term names
    #[serde(default = "default_abbreviations")]
    pub abbreviations: Vec<Abbreviation>,
    /// Where rendered files go; next to the policy file when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Write a `.sha256` file beside every rendered output
    #[serde(default = "default_true")]
    pub write_checksums: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            exp_info_weeks: default_exp_info_weeks(),
            abbreviations: default_abbreviations(),
            output_dir: None,
            write_checksums: true,
        }
    }
}

fn default_exp_info_weeks() -> u32 {
    2
}

pub fn default_abbreviations() -> Vec<Abbreviation> {
    vec![Abbreviation::new("experiment", "EXP")]
}

fn default_true() -> bool {
    true
}

/// Default config location: `$XDG_CONFIG_HOME/aclgen/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Loads the generator config.
///
/// An explicit `path` must exist. Without one, the XDG location is tried and
/// a missing file yields defaults. A file that exists but does not parse is
/// always an error.
///
/// # Async
/// Uses `tokio::fs` for non-blocking I/O.
pub async fn load_config(path: Option<&Path>) -> Result<GeneratorConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(GeneratorConfig::default()),
        },
    };

    let json = match tokio::fs::read_to_string(&path).await {
        Ok(json) => json,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(GeneratorConfig::default());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    serde_json::from_str(&json).map_err(|e| Error::PolicyFile {
        path: path.display().to_string(),
        message: format!("invalid config: {e}"),
    })
}

//! Utility functions for directory management
//!
//! Follows the XDG Base Directory specification for the config location.
//!
//! # Directory Structure
//!
//! - Config: `~/.config/aclgen/` - `config.json` with generator settings
//!
//! # Example
//!
//! ```
//! use aclgen::utils::get_config_dir;
//!
//! if let Some(config_path) = get_config_dir() {
//!     // Load configuration from config_path
//!     let _ = config_path.join("config.json");
//! }
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "aclgen", "aclgen").map(|pd| pd.config_dir().to_path_buf())
}

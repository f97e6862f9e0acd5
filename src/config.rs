use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Configuration for spawning the analysis server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisServerConfig {
    #[serde(default = "default_server_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_language_id")]
    pub language_id: String,
}

impl Default for AnalysisServerConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            args: Vec::new(),
            language_id: default_language_id(),
        }
    }
}

fn default_server_command() -> String {
    // Check environment variable first, then fall back to rust-analyzer
    std::env::var("GLINT_SERVER").unwrap_or_else(|_| "rust-analyzer".to_string())
}

fn default_language_id() -> String {
    "rust".to_string()
}

pub fn default_config_path() -> PathBuf {
    let Some(dirs) = ProjectDirs::from("io", "glint", "glint") else {
        return Path::new("glint.json").to_path_buf();
    };
    dirs.config_dir().join("server.json")
}

pub fn load_config(path: &Path) -> AnalysisServerConfig {
    let Ok(bytes) = fs::read(path) else {
        return AnalysisServerConfig::default();
    };
    serde_json::from_slice::<AnalysisServerConfig>(&bytes).unwrap_or_default()
}

pub fn save_config(path: &Path, cfg: &AnalysisServerConfig) -> Result<(), String> {
    let json = serde_json::to_vec_pretty(cfg).map_err(|e| e.to_string())?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::write(path, json).map_err(|e| e.to_string())
}

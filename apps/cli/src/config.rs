use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    /// Empty means `CLAUDE_CONFIG_DIR` or the standard locations.
    pub log_roots: Vec<PathBuf>,
    pub batch_size: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: ingest::default_data_dir(),
            log_roots: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CliConfig {
    pub fn log_roots(&self) -> Vec<PathBuf> {
        if self.log_roots.is_empty() {
            ingest::default_log_roots()
        } else {
            self.log_roots.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CliConfig,
    pub file: PathBuf,
    pub created: bool,
}

pub fn load_or_create(explicit: Option<&Path>) -> Result<ConfigLoad, String> {
    let file = match explicit {
        Some(path) => path.to_path_buf(),
        None => crate::dirs::config_dir().join(CONFIG_FILE_NAME),
    };

    if file.exists() {
        let contents = fs::read_to_string(&file)
            .map_err(|err| format!("read config {}: {}", file.display(), err))?;
        let config: CliConfig = toml::from_str(&contents)
            .map_err(|err| format!("parse config {}: {}", file.display(), err))?;
        return Ok(ConfigLoad {
            config,
            file,
            created: false,
        });
    }

    if let Some(dir) = file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|err| format!("create config dir {}: {}", dir.display(), err))?;
    }
    let config = CliConfig::default();
    let contents =
        toml::to_string_pretty(&config).map_err(|err| format!("serialize config: {}", err))?;
    fs::write(&file, contents)
        .map_err(|err| format!("write config {}: {}", file.display(), err))?;

    Ok(ConfigLoad {
        config,
        file,
        created: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_defaults_then_reads_them_back() {
        let dir = tempdir().expect("temp dir");
        let file = dir.path().join("nested").join("config.toml");

        let created = load_or_create(Some(file.as_path())).expect("create");
        assert!(created.created);
        assert!(file.exists());
        assert_eq!(created.config.batch_size, 100);

        let loaded = load_or_create(Some(file.as_path())).expect("load");
        assert!(!loaded.created);
        assert_eq!(loaded.config, created.config);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let dir = tempdir().expect("temp dir");
        let file = dir.path().join("config.toml");
        fs::write(&file, "log_roots = [\"/logs/a\"]\n").expect("write config");

        let loaded = load_or_create(Some(file.as_path())).expect("load");
        assert_eq!(loaded.config.log_roots, vec![PathBuf::from("/logs/a")]);
        assert_eq!(loaded.config.log_roots(), vec![PathBuf::from("/logs/a")]);
        assert_eq!(loaded.config.batch_size, 100);
    }

    #[test]
    fn rejects_malformed_config() {
        let dir = tempdir().expect("temp dir");
        let file = dir.path().join("config.toml");
        fs::write(&file, "batch_size = \"lots\"\n").expect("write config");
        let err = load_or_create(Some(file.as_path())).expect_err("malformed");
        assert!(err.starts_with("parse config"));
    }
}

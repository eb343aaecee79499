use std::path::PathBuf;

use crate::Result;

pub const DB_FILE_NAME: &str = "command_center.db";
pub const PROJECTS_FILE_NAME: &str = "command-center-projects.json";
pub const PRICING_CACHE_FILE_NAME: &str = "pricing_cache.json";

/// File locations inside one data directory.
#[derive(Clone, Debug)]
pub struct AppPaths {
    pub app_data_dir: PathBuf,
    pub db_path: PathBuf,
    pub projects_path: PathBuf,
    pub pricing_cache_path: PathBuf,
}

impl AppPaths {
    pub fn new(app_data_dir: PathBuf) -> Self {
        let db_path = app_data_dir.join(DB_FILE_NAME);
        let projects_path = app_data_dir.join(PROJECTS_FILE_NAME);
        let pricing_cache_path = app_data_dir.join(PRICING_CACHE_FILE_NAME);
        Self {
            app_data_dir,
            db_path,
            projects_path,
            pricing_cache_path,
        }
    }

    pub fn default_location() -> Self {
        Self::new(ingest::default_data_dir())
    }
}

pub fn ensure_app_data_dir(paths: &AppPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.app_data_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_file_names_from_data_dir() {
        let paths = AppPaths::new(PathBuf::from("/data"));
        assert_eq!(paths.db_path, PathBuf::from("/data/command_center.db"));
        assert_eq!(
            paths.projects_path,
            PathBuf::from("/data/command-center-projects.json")
        );
        assert_eq!(
            paths.pricing_cache_path,
            PathBuf::from("/data/pricing_cache.json")
        );
    }
}

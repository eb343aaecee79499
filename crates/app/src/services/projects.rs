use crate::error::{AppError, Result};
use crate::services::SharedConfig;
use ingest::{ProjectStore, ProjectUpdate};
use usage_core::ProjectListing;

#[derive(Clone)]
pub struct ProjectsService {
    config: SharedConfig,
}

impl ProjectsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn store(&self) -> Result<ProjectStore> {
        Ok(ProjectStore::load(&self.config.projects_path)?)
    }

    pub fn list(&self) -> Result<Vec<ProjectListing>> {
        Ok(self.store()?.list())
    }

    pub fn get(&self, project_id: &str) -> Result<ProjectListing> {
        let store = self.store()?;
        let metadata = store
            .get(project_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown project: {project_id}")))?;
        Ok(ProjectListing {
            project_id: project_id.to_string(),
            metadata,
        })
    }

    /// Applies the provided fields and persists the store.
    pub fn update(&self, project_id: &str, update: &ProjectUpdate) -> Result<ProjectListing> {
        let mut store = self.store()?;
        let listing = store.update_fields(project_id, update)?;
        store.save()?;
        Ok(listing)
    }
}

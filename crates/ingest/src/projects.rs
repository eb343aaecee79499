use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use usage_core::{ProjectListing, ProjectMetadata, UNKNOWN_PROJECT, decode_project_id};

use crate::types::ProjectStoreError;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Fields a user may edit. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visible: Option<bool>,
}

/// The side JSON document mapping project id to its metadata.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    path: PathBuf,
    projects: BTreeMap<String, ProjectMetadata>,
}

fn io_error(path: &Path, source: std::io::Error) -> ProjectStoreError {
    ProjectStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn checked_field(label: &str, value: &str, max_chars: usize) -> Result<String, ProjectStoreError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max_chars {
        return Err(ProjectStoreError::InvalidField(format!(
            "{label} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

impl ProjectStore {
    /// Loads the document; a missing or empty file is an empty store.
    ///
    /// Documents written before `visible` existed load as visible.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ProjectStoreError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "project metadata missing; starting empty");
                return Ok(Self {
                    path,
                    projects: BTreeMap::new(),
                });
            }
            Err(err) => return Err(io_error(&path, err)),
        };
        let projects = if raw.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&raw).map_err(|source| ProjectStoreError::Corrupted {
                path: path.clone(),
                source,
            })?
        };
        Ok(Self { path, projects })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the document through a temp file so readers never see a torn file.
    pub fn save(&self) -> Result<(), ProjectStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
        }
        let body = serde_json::to_string_pretty(&self.projects).map_err(|source| {
            ProjectStoreError::Corrupted {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|err| io_error(&tmp, err))?;
        fs::rename(&tmp, &self.path).map_err(|err| io_error(&self.path, err))
    }

    /// Records newly seen ids with defaults and bumps `last_seen` for known ones.
    /// Returns how many ids were new.
    pub fn auto_discover<'a, I>(&mut self, project_ids: I, now: &str) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut created = 0;
        for project_id in project_ids {
            if project_id == UNKNOWN_PROJECT || project_id.is_empty() {
                continue;
            }
            match self.projects.get_mut(project_id) {
                Some(existing) => existing.last_seen = now.to_string(),
                None => {
                    self.projects.insert(
                        project_id.to_string(),
                        ProjectMetadata {
                            name: String::new(),
                            description: String::new(),
                            absolute_path: decode_project_id(project_id),
                            first_seen: now.to_string(),
                            last_seen: now.to_string(),
                            visible: true,
                        },
                    );
                    created += 1;
                }
            }
        }
        created
    }

    pub fn update_fields(
        &mut self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<ProjectListing, ProjectStoreError> {
        let name = update
            .name
            .as_deref()
            .map(|value| checked_field("name", value, MAX_NAME_CHARS))
            .transpose()?;
        let description = update
            .description
            .as_deref()
            .map(|value| checked_field("description", value, MAX_DESCRIPTION_CHARS))
            .transpose()?;
        let metadata = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| ProjectStoreError::UnknownProject(project_id.to_string()))?;
        if let Some(name) = name {
            metadata.name = name;
        }
        if let Some(description) = description {
            metadata.description = description;
        }
        if let Some(visible) = update.visible {
            metadata.visible = visible;
        }
        Ok(ProjectListing {
            project_id: project_id.to_string(),
            metadata: metadata.clone(),
        })
    }

    pub fn get(&self, project_id: &str) -> Option<&ProjectMetadata> {
        self.projects.get(project_id)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Most recently seen first.
    pub fn list(&self) -> Vec<ProjectListing> {
        let mut listings: Vec<ProjectListing> = self
            .projects
            .iter()
            .map(|(project_id, metadata)| ProjectListing {
                project_id: project_id.clone(),
                metadata: metadata.clone(),
            })
            .collect();
        listings.sort_by(|a, b| {
            b.metadata
                .last_seen
                .cmp(&a.metadata.last_seen)
                .then_with(|| a.project_id.cmp(&b.project_id))
        });
        listings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_and_bumps_projects() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("projects.json");
        let mut store = ProjectStore::load(&path).expect("load");
        assert!(store.is_empty());

        let created = store.auto_discover(["-home-xai-app", "unknown"], "2025-06-01T10:00:00+00:00");
        assert_eq!(created, 1);
        let meta = store.get("-home-xai-app").expect("project");
        assert_eq!(meta.absolute_path.as_deref(), Some("/home/xai/app"));
        assert!(meta.visible);
        assert!(store.get("unknown").is_none());

        let created = store.auto_discover(["-home-xai-app"], "2025-06-02T10:00:00+00:00");
        assert_eq!(created, 0);
        let meta = store.get("-home-xai-app").expect("project");
        assert_eq!(meta.first_seen, "2025-06-01T10:00:00+00:00");
        assert_eq!(meta.last_seen, "2025-06-02T10:00:00+00:00");

        store.save().expect("save");
        let reloaded = ProjectStore::load(&path).expect("reload");
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn old_documents_default_to_visible() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("projects.json");
        fs::write(
            &path,
            r#"{"-a":{"name":"A","description":"","absolute_path":"/a","first_seen":"x","last_seen":"x"}}"#,
        )
        .expect("write");
        let store = ProjectStore::load(&path).expect("load");
        assert!(store.get("-a").expect("project").visible);
    }

    #[test]
    fn corrupted_document_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("projects.json");
        fs::write(&path, "{ nope").expect("write");
        let err = ProjectStore::load(&path).expect_err("corrupted");
        assert!(matches!(err, ProjectStoreError::Corrupted { .. }));
        assert!(err.to_string().contains("full rebuild"));
    }

    #[test]
    fn update_validates_and_trims() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = ProjectStore::load(dir.path().join("p.json")).expect("load");
        store.auto_discover(["-a"], "2025-06-01T00:00:00+00:00");

        let listing = store
            .update_fields(
                "-a",
                &ProjectUpdate {
                    name: Some("  Alpha  ".to_string()),
                    description: None,
                    visible: Some(false),
                },
            )
            .expect("update");
        assert_eq!(listing.metadata.name, "Alpha");
        assert!(!listing.metadata.visible);

        let too_long = ProjectUpdate {
            name: Some("x".repeat(MAX_NAME_CHARS + 1)),
            ..ProjectUpdate::default()
        };
        assert!(matches!(
            store.update_fields("-a", &too_long),
            Err(ProjectStoreError::InvalidField(_))
        ));
        assert!(matches!(
            store.update_fields("-missing", &ProjectUpdate::default()),
            Err(ProjectStoreError::UnknownProject(_))
        ));
    }

    #[test]
    fn list_is_most_recent_first() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = ProjectStore::load(dir.path().join("p.json")).expect("load");
        store.auto_discover(["-old"], "2025-06-01T00:00:00+00:00");
        store.auto_discover(["-new"], "2025-06-05T00:00:00+00:00");
        let ids: Vec<String> = store.list().into_iter().map(|p| p.project_id).collect();
        assert_eq!(ids, vec!["-new".to_string(), "-old".to_string()]);
    }
}

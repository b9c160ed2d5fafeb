use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Project name must be alphanumeric with underscores: {0}")]
    InvalidName(String),
    #[error("Project '{0}' not found")]
    NotFound(String),
    #[error("Failed to read project directory: {0}")]
    Io(String),
}

/// Maps project names to database files under the data directory:
/// `<data_dir>/<project>/<project>.duckdb`.
#[derive(Debug, Clone)]
pub struct ProjectCatalog {
    data_dir: PathBuf,
}

impl ProjectCatalog {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn validate_name(project: &str) -> Result<(), CatalogError> {
        if project.is_empty() || !project.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(CatalogError::InvalidName(project.to_string()));
        }
        Ok(())
    }

    pub fn db_path(&self, project: &str) -> PathBuf {
        self.data_dir
            .join(project)
            .join(format!("{}.duckdb", project))
    }

    /// Path of an existing project's database. The file itself may still be
    /// missing; opening it is the session's concern.
    pub fn resolve(&self, project: &str) -> Result<PathBuf, CatalogError> {
        Self::validate_name(project)?;
        let project_dir = self.data_dir.join(project);
        if !project_dir.is_dir() {
            return Err(CatalogError::NotFound(project.to_string()));
        }
        let db_path = self.db_path(project);
        debug!("Resolved project '{}' to {}", project, db_path.display());
        Ok(db_path)
    }

    /// Projects that have a database file, sorted by name.
    pub async fn list(&self) -> Result<Vec<String>, CatalogError> {
        let mut projects = Vec::new();

        if !self.data_dir.exists() {
            return Ok(projects);
        }

        let mut entries = tokio::fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| CatalogError::Io(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CatalogError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if self.db_path(name).is_file() {
                        projects.push(name.to_string());
                    }
                }
            }
        }

        projects.sort();
        Ok(projects)
    }
}

//! Case identifiers and the per-case directory layout.
//!
//! Every externally supplied case id and file name passes through the guards
//! here before touching the filesystem. The rules are strict on purpose:
//! no traversal components, no separators, no dot-prefixed names, and the
//! resolved case directory must stay inside the configured cases root.

use std::path::{Path, PathBuf};

use crate::types::CoreError;

/// Validated case identifier: a single safe path segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        validate_segment(&raw, "case id")?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejects traversal attempts, separators, hidden names, and blank input.
fn validate_segment(segment: &str, what: &str) -> Result<(), CoreError> {
    if segment.trim().is_empty() {
        return Err(CoreError::PathValidation(format!("{what} cannot be empty")));
    }
    if segment.contains("..") {
        return Err(CoreError::PathValidation(format!(
            "{what} contains a path traversal sequence"
        )));
    }
    if segment.contains('/') || segment.contains('\\') {
        return Err(CoreError::PathValidation(format!(
            "{what} contains a path separator"
        )));
    }
    if segment.starts_with('.') {
        return Err(CoreError::PathValidation(format!(
            "{what} cannot start with '.'"
        )));
    }
    Ok(())
}

/// Validates a file name used inside a case directory.
pub fn validate_file_name(file_name: &str) -> Result<(), CoreError> {
    validate_segment(file_name, "file name")
}

/// Resolves paths inside the cases root.
#[derive(Clone, Debug)]
pub struct CaseLayout {
    cases_dir: PathBuf,
}

impl CaseLayout {
    pub fn new(cases_dir: impl Into<PathBuf>) -> Self {
        Self {
            cases_dir: cases_dir.into(),
        }
    }

    pub fn cases_dir(&self) -> &Path {
        &self.cases_dir
    }

    pub fn case_dir(&self, case: &CaseId) -> PathBuf {
        self.cases_dir.join(case.as_str())
    }

    pub fn document_index_path(&self, case: &CaseId) -> PathBuf {
        self.case_dir(case).join("document_index.json")
    }

    pub fn raw_text_dir(&self, case: &CaseId) -> PathBuf {
        self.case_dir(case).join("raw_text")
    }

    pub fn session_path(&self, case: &CaseId) -> PathBuf {
        self.case_dir(case).join("session.json")
    }

    pub fn upload_path(&self, case: &CaseId, file_name: &str) -> Result<PathBuf, CoreError> {
        validate_file_name(file_name)?;
        Ok(self.case_dir(case).join(file_name))
    }

    /// Creates the case directory if needed and verifies it is a real
    /// directory inside the cases root (symlinked case directories are
    /// rejected).
    pub async fn ensure_case(&self, case: &CaseId) -> Result<PathBuf, CoreError> {
        let dir = self.case_dir(case);
        if !tokio::fs::try_exists(&dir).await? {
            tokio::fs::create_dir_all(&dir).await?;
        }
        self.checked_case_dir(case).await
    }

    /// Resolves an existing case directory, failing with `CaseNotFound` when
    /// it does not exist.
    pub async fn existing_case(&self, case: &CaseId) -> Result<PathBuf, CoreError> {
        let dir = self.case_dir(case);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(CoreError::CaseNotFound(case.to_string()));
        }
        self.checked_case_dir(case).await
    }

    async fn checked_case_dir(&self, case: &CaseId) -> Result<PathBuf, CoreError> {
        let dir = self.case_dir(case);

        let meta = tokio::fs::symlink_metadata(&dir).await?;
        if meta.is_symlink() {
            return Err(CoreError::PathValidation(
                "symlinked case directories are not allowed".to_string(),
            ));
        }
        if !meta.is_dir() {
            return Err(CoreError::PathValidation(format!(
                "case path is not a directory: {case}"
            )));
        }

        let canonical = tokio::fs::canonicalize(&dir).await?;
        let canonical_root = tokio::fs::canonicalize(&self.cases_dir).await?;
        if !canonical.starts_with(&canonical_root) {
            return Err(CoreError::PathValidation(
                "case path escapes the cases root".to_string(),
            ));
        }

        Ok(dir)
    }
}

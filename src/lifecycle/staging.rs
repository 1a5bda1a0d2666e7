//! Staged Terraform files.
//!
//! Extra code for a change scenario lives next to the module under a name
//! without the `.tf` extension, so the tool ignores it. Staging renames it to
//! `<file>.tf` for the duration of one plan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// A file renamed to `<file>.tf`, restored when dropped.
#[derive(Debug)]
pub struct StagedFile {
    original: PathBuf,
    staged: PathBuf,
}

impl StagedFile {
    /// Renames `path` to `<path>.tf`.
    ///
    /// Returns `None` and logs a warning when `<path>.tf` already exists or
    /// the rename fails; the scenario then plans without the extra code.
    #[must_use]
    pub fn stage(path: &Path) -> Option<Self> {
        let staged = staged_path(path);
        // rename would replace an existing file, and the restore would lose it
        if staged.exists() {
            warn!(
                "Not staging {}: {} already exists",
                path.display(),
                staged.display()
            );
            return None;
        }
        match fs::rename(path, &staged) {
            Ok(()) => {
                debug!("Staged {} as {}", path.display(), staged.display());
                Some(Self {
                    original: path.to_path_buf(),
                    staged,
                })
            }
            Err(e) => {
                warn!("Error while preparing additional file with code to deploy: {e}");
                None
            }
        }
    }

    /// Path of the file while staged.
    #[must_use]
    pub fn staged_path(&self) -> &Path {
        &self.staged
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = fs::rename(&self.staged, &self.original) {
            warn!(
                "Failed to restore {} from {}: {e}",
                self.original.display(),
                self.staged.display()
            );
        } else {
            debug!("Restored {}", self.original.display());
        }
    }
}

fn staged_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tf");
    PathBuf::from(name)
}

/// Copies `sample` to `active` byte for byte when `active` does not exist.
///
/// Returns true if a copy was made. Running it again is a no-op.
///
/// # Errors
///
/// Returns the I/O error if the sample cannot be copied.
pub fn ensure_from_sample(sample: &Path, active: &Path) -> io::Result<bool> {
    if active.exists() {
        debug!("{} already exists", active.display());
        return Ok(false);
    }
    if let Some(parent) = active.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::copy(sample, active)?;
    info!("Created {} from {}", active.display(), sample.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("extra_subnet");
        fs::write(&extra, "resource \"null_resource\" \"x\" {}").unwrap();

        {
            let staged = StagedFile::stage(&extra).unwrap();
            assert_eq!(staged.staged_path(), dir.path().join("extra_subnet.tf"));
            assert!(staged.staged_path().exists());
            assert!(!extra.exists());
        }

        assert!(extra.exists());
        assert!(!dir.path().join("extra_subnet.tf").exists());
    }

    #[test]
    fn test_stage_missing_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StagedFile::stage(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_stage_keeps_existing_tf_file() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("extra_subnet");
        let existing = dir.path().join("extra_subnet.tf");
        fs::write(&extra, "scenario code").unwrap();
        fs::write(&existing, "module code").unwrap();

        assert!(StagedFile::stage(&extra).is_none());
        assert_eq!(fs::read_to_string(&extra).unwrap(), "scenario code");
        assert_eq!(fs::read_to_string(&existing).unwrap(), "module code");
    }

    #[test]
    fn test_ensure_from_sample_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("backend.tf.sample");
        let active = dir.path().join("backend.tf");
        fs::write(&sample, b"terraform {\n  backend \"local\" {}\n}\n").unwrap();

        assert!(ensure_from_sample(&sample, &active).unwrap());
        assert_eq!(fs::read(&active).unwrap(), fs::read(&sample).unwrap());

        fs::write(&active, b"edited").unwrap();
        assert!(!ensure_from_sample(&sample, &active).unwrap());
        assert_eq!(fs::read(&active).unwrap(), b"edited");
    }

    #[test]
    fn test_ensure_from_missing_sample_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ensure_from_sample(&dir.path().join("nope"), &dir.path().join("active"));
        assert!(result.is_err());
    }
}

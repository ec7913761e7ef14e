//! Working directories for scenario runs
//!
//! Isolated runs get a private copy of the terraform configuration so
//! concurrent `terraform init` calls never share a `.terraform` directory or
//! state file.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::common::{paths, Error, Result};

/// Directory a scenario provisions from
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl WorkDir {
    /// Use an existing directory in place
    pub fn shared(path: PathBuf) -> Self {
        Self { path, temp: None }
    }

    /// Directory terraform runs in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this is a private temporary copy
    pub fn is_isolated(&self) -> bool {
        self.temp.is_some()
    }

    /// Remove the temporary copy, or leave it on disk when `keep` is set
    ///
    /// Returns the retained path when kept.
    pub fn release(self, keep: bool) -> Result<Option<PathBuf>> {
        match self.temp {
            None => Ok(None),
            Some(temp) if keep => Ok(Some(temp.into_path())),
            Some(temp) => {
                temp.close()?;
                Ok(None)
            }
        }
    }
}

/// Options for an isolated copy
#[derive(Debug, Clone, Default)]
pub struct CopySpec<'a> {
    /// Directory copied as a whole; defaults to the source directory
    pub root: Option<&'a Path>,
    /// Entry names skipped at any depth
    pub exclude: &'a [String],
    /// Prefix for the temporary directory name
    pub prefix: &'a str,
}

/// Copy `source_dir` (or its `root` ancestor) into a fresh temporary directory under `parent`
pub fn isolated_copy(source_dir: &Path, parent: &Path, spec: &CopySpec<'_>) -> Result<WorkDir> {
    let source = canonical(source_dir)?;
    let root = match spec.root {
        Some(root) => canonical(root)?,
        None => source.clone(),
    };
    let relative = source.strip_prefix(&root).map_err(|_| {
        Error::Setup(format!(
            "Source directory '{}' is not inside copy root '{}'",
            source.display(),
            root.display()
        ))
    })?;

    paths::ensure_dir(parent)
        .map_err(|e| Error::Setup(format!("Cannot create '{}': {}", parent.display(), e)))?;
    let temp = tempfile::Builder::new()
        .prefix(spec.prefix)
        .tempdir_in(parent)
        .map_err(|e| Error::Setup(format!("Cannot create temporary directory: {e}")))?;

    copy_tree(&root, temp.path(), spec.exclude)?;

    let path = temp.path().join(relative);
    tracing::debug!("Copied {} to {}", root.display(), temp.path().display());
    Ok(WorkDir {
        path,
        temp: Some(temp),
    })
}

fn canonical(dir: &Path) -> Result<PathBuf> {
    let path = dir
        .canonicalize()
        .map_err(|e| Error::Setup(format!("Source directory '{}': {}", dir.display(), e)))?;
    if !path.is_dir() {
        return Err(Error::Setup(format!(
            "Source '{}' is not a directory",
            path.display()
        )));
    }
    Ok(path)
}

/// Hidden entries (`.terraform`, `.git`, lock files) and state files stay behind
fn skip_entry(name: &str, exclude: &[String]) -> bool {
    name.starts_with('.')
        || name.ends_with(".tfstate")
        || name.ends_with(".tfstate.backup")
        || exclude.iter().any(|e| e == name)
}

fn copy_tree(from: &Path, to: &Path, exclude: &[String]) -> Result<()> {
    // the root itself may live under a hidden temp directory name
    let walker = WalkDir::new(from).min_depth(1).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || !skip_entry(&entry.file_name().to_string_lossy(), exclude)
    });

    for entry in walker {
        let entry = entry.map_err(|e| Error::Setup(format!("Copy failed: {e}")))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let target = to.join(relative);

        let copied = if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
        } else {
            std::fs::copy(entry.path(), &target).map(|_| ())
        };
        copied.map_err(|e| {
            Error::Setup(format!(
                "Failed to copy '{}': {}",
                entry.path().display(),
                e
            ))
        })?;
    }
    Ok(())
}

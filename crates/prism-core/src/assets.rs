//! Asset directory lookup.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Root directory for runtime assets (textures).
#[derive(Clone, Debug)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    /// Open an asset directory. Fails if it does not exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !std::fs::metadata(&root)?.is_dir() {
            return Err(Error::NotFound(format!("{} is not a directory", root.display())));
        }
        Ok(Self { root })
    }

    /// Root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file inside the directory. Missing files are an error.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NotFound(path.display().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_file() {
        let dir = AssetDir::open(env!("CARGO_MANIFEST_DIR")).unwrap();
        assert!(dir.resolve("Cargo.toml").is_ok());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = AssetDir::open(env!("CARGO_MANIFEST_DIR")).unwrap();
        assert!(matches!(dir.resolve("missing.png"), Err(Error::NotFound(_))));
    }

    #[test]
    fn missing_dir_is_io_error() {
        assert!(matches!(
            AssetDir::open("/definitely/not/here"),
            Err(Error::Io(_))
        ));
    }
}

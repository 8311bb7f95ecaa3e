//! Asset readiness — answers "is this asset on local disk yet?".
//!
//! Downloading is someone else's job; the engine only asks. Readiness is
//! never cached: every check goes back to the oracle.

use dashmap::DashSet;
use std::path::{Path, PathBuf};

pub trait AssetOracle: Send + Sync {
    fn exists(&self, storage_root: &Path, asset_id: &str) -> bool;
}

/// Checks for `<storage_root>/<asset_id>` on the filesystem.
pub struct FsAssetOracle;

impl AssetOracle for FsAssetOracle {
    fn exists(&self, storage_root: &Path, asset_id: &str) -> bool {
        storage_root.join(asset_id).is_file()
    }
}

/// In-memory oracle for tests and hosts that track downloads themselves.
#[derive(Default)]
pub struct MemoryAssetOracle {
    present: DashSet<String>,
}

impl MemoryAssetOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_present(&self, asset_id: &str) {
        self.present.insert(asset_id.to_string());
    }

    pub fn mark_missing(&self, asset_id: &str) {
        self.present.remove(asset_id);
    }
}

impl AssetOracle for MemoryAssetOracle {
    fn exists(&self, _storage_root: &Path, asset_id: &str) -> bool {
        self.present.contains(asset_id)
    }
}

/// Oracle plus the storage root it should look under.
pub struct AssetLocator<'a> {
    pub oracle: &'a dyn AssetOracle,
    pub storage_root: &'a PathBuf,
}

impl AssetLocator<'_> {
    /// Logical AND over the manifest. An empty manifest is trivially ready.
    pub fn all_present<S: AsRef<str>>(&self, manifest: &[S]) -> bool {
        manifest
            .iter()
            .all(|id| self.oracle.exists(self.storage_root, id.as_ref()))
    }

    pub fn missing<'m, S: AsRef<str>>(&self, manifest: &'m [S]) -> Vec<&'m str> {
        manifest
            .iter()
            .map(|id| <S as AsRef<str>>::as_ref(id))
            .filter(|id| !self.oracle.exists(self.storage_root, id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_oracle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hero.png"), b"png").unwrap();

        let oracle = FsAssetOracle;
        assert!(oracle.exists(dir.path(), "hero.png"));
        assert!(!oracle.exists(dir.path(), "missing.png"));
    }

    #[test]
    fn test_locator_all_present_and_missing() {
        let oracle = MemoryAssetOracle::new();
        oracle.mark_present("a.png");
        let root = PathBuf::from("/unused");
        let locator = AssetLocator {
            oracle: &oracle,
            storage_root: &root,
        };

        assert!(locator.all_present::<&str>(&[]));
        assert!(locator.all_present(&["a.png"]));
        assert!(!locator.all_present(&["a.png", "b.png"]));
        assert_eq!(locator.missing(&["a.png", "b.png"]), vec!["b.png"]);

        oracle.mark_missing("a.png");
        assert!(!locator.all_present(&["a.png"]));
    }
}

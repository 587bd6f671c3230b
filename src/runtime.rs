//! Process-wide context, explicitly injected.
//!
//! There is no global config or global song map: everything a subsystem
//! needs arrives through a [`Runtime`] reference built once at startup.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::library::{Library, builder};
use crate::tags::TagExtractor;

/// Loaded config, resolved paths, the shared library and the tag layer.
pub struct Runtime {
    pub config: Config,
    pub config_path: PathBuf,
    pub index_path: PathBuf,
    pub library: Arc<Library>,
    pub extractor: Arc<TagExtractor>,
}

impl Runtime {
    /// Build the runtime: set up the tag extractor and load (or rebuild)
    /// the library index.
    pub fn bootstrap(
        config: Config,
        config_path: PathBuf,
        index_path: PathBuf,
        art_dir: PathBuf,
    ) -> Result<Self> {
        let extractor = Arc::new(TagExtractor::new(art_dir));

        let plan = config.sort_plan();
        let map = builder::load_or_build(
            &index_path,
            &config.library.directory,
            &plan,
            &extractor,
        )?;

        Ok(Self {
            config,
            config_path,
            index_path,
            library: Arc::new(Library::new(map)),
            extractor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bootstrap_builds_and_caches() {
        let music = tempdir().unwrap();
        let state = tempdir().unwrap();
        crate::test_utils::write_test_wav(&music.path().join("song.wav"), 100);

        let mut config = Config::default();
        config.library.directory = music.path().to_path_buf();

        let index_path = state.path().join("lib.bin");
        let runtime = Runtime::bootstrap(
            config.clone(),
            state.path().join("config.toml"),
            index_path.clone(),
            state.path().join("art"),
        )
        .unwrap();

        assert_eq!(runtime.library.count_tracks(), 1);
        assert!(index_path.exists());

        // Second bootstrap hits the cache and agrees.
        let runtime2 = Runtime::bootstrap(
            config,
            state.path().join("config.toml"),
            index_path.clone(),
            state.path().join("art"),
        )
        .unwrap();
        assert_eq!(runtime2.library.count_tracks(), 1);
    }
}

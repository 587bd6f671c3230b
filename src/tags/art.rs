//! Album-art cache.
//!
//! Embedded cover art is extracted once per source file into
//! `<cache>/art/<sha256-of-path>.jpg` and referenced by `file://` URI.
//! The `.jpg` extension is kept even for PNG payloads: downstream loaders
//! key off the extension, and changing it breaks them.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{TagError, TagSource};

/// Cache key for a source path: hex SHA-256 of its byte representation.
pub fn art_cache_key(path: &Path) -> String {
    let digest = Sha256::digest(path.as_os_str().as_encoded_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Destination file inside the art cache for `path`.
pub fn art_cache_path(art_dir: &Path, path: &Path) -> PathBuf {
    art_dir.join(format!("{}.jpg", art_cache_key(path)))
}

/// Extract the embedded cover of `path` into the cache.
///
/// Returns the `file://` URI when art exists (already cached or freshly
/// written), `None` when the file has no embedded picture.
pub fn cache_embedded_art(
    source: &dyn TagSource,
    art_dir: &Path,
    path: &Path,
) -> Result<Option<String>, TagError> {
    let dest = art_cache_path(art_dir, path);

    if !dest.exists() {
        let wrote = source.extract_thumbnail(path, &dest)?;
        if !wrote {
            return Ok(None);
        }
        tracing::debug!(
            target: "tags::art",
            src = %path.display(),
            dest = %dest.display(),
            "cached embedded art"
        );
    }

    Ok(Some(format!("file://{}", dest.display())))
}

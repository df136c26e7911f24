mod asset_store;
mod feed_cache;
mod types;

pub use asset_store::{AssetError, AssetStore};
pub use feed_cache::{CacheError, FeedCache};
pub use types::{FeedSnapshot, Post};

use std::io::Write;
use std::path::Path;

/// Atomically replaces `dst` with `bytes` using write-to-temp-then-rename.
///
/// A reader concurrently opening `dst` sees either the previous content or
/// the new content in full, never a partial write. The temp file name is
/// randomized so a crashed writer cannot collide with a live one.
pub(crate) fn atomic_write(dst: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // fails atomically if the path exists
        .open(&temp_path)?;

    if let Err(e) = temp_file
        .write_all(bytes)
        .and_then(|_| temp_file.sync_all())
    {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }
    drop(temp_file);

    // POSIX guarantees rename atomicity on the same filesystem.
    #[cfg(windows)]
    if dst.exists() {
        if let Err(e) = std::fs::remove_file(dst) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    if let Err(e) = std::fs::rename(&temp_path, dst) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

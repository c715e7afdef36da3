//! Per-page HTML snapshots
//!
//! Every successfully crawled page's HTML is kept as
//! `<url with "://" and "/" replaced by "_">.html` so later diffing can look at
//! the exact markup the block map was built from.

use crate::storage::json::write_atomic;
use crate::QaError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the snapshot for `url`
///
/// # Examples
///
/// ```
/// use qa_crawler::storage::snapshot_file_name;
///
/// assert_eq!(
///     snapshot_file_name("https://main--site.example/express/"),
///     "https_main--site.example_express_.html"
/// );
/// ```
pub fn snapshot_file_name(url: &str) -> String {
    format!("{}.html", url.replace("://", "_").replace('/', "_"))
}

/// Writes the snapshot of `url` into `dir`, replacing any previous one
///
/// Returns the path written.
pub fn write_dom_snapshot(dir: &Path, url: &str, html: &str) -> Result<PathBuf, QaError> {
    fs::create_dir_all(dir)?;

    let path = dir.join(snapshot_file_name(url));
    write_atomic(&path, |file| {
        file.write_all(html.as_bytes())?;
        Ok(())
    })?;

    debug!("DOM snapshot saved to {}", path.display());
    Ok(path)
}

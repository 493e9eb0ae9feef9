/*!
 * Core Types
 * Common types used across the pipeline
 */

use chrono::{DateTime, Utc};

/// Storage row key of an order
pub type RowId = i64;

/// Externally visible order identifier (UUID v4 text)
pub type OrderId = String;

/// Wall-clock instant persisted on orders
pub type Timestamp = DateTime<Utc>;

/// Current instant; kept behind one function so every component stamps
/// orders the same way
#[inline]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Resolve `path` against the current directory unless already absolute
pub fn absolute_path(path: &std::path::Path) -> std::path::PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

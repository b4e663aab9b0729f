//! Static resources served from mounted directory trees.
//!
//! A [`ResourceCache`] maps URI prefixes to directories and keeps one open
//! file handle per absolute path, shared by every connection that asks for
//! it.

pub mod cache;
pub mod mount;

pub use cache::{CachedResource, ResourceCache};
pub use mount::MountMapping;

/// Substrings rejected in any URI path before it touches the filesystem.
pub const DEFAULT_FORBIDDEN: &[&str] = &["..", ":"];

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// No mount covers the path, or the file does not exist.
    #[error("resource not found")]
    NotFound,
    /// The path contains a forbidden substring.
    #[error("uri contains forbidden characters")]
    Forbidden,
    /// The file exists but could not be opened or inspected.
    #[error("resource fault: {0}")]
    Fault(#[from] std::io::Error),
    #[error("mount directory does not exist: {0}")]
    MissingDirectory(std::path::PathBuf),
    #[error("invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

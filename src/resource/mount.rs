use std::path::{Path, PathBuf};

/// A URI prefix served from one directory on disk.
///
/// The prefix always ends with `/`. Remainders are appended segment by
/// segment, so the resolved path is always rooted at `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountMapping {
    uri: String,
    dir: PathBuf,
}

impl MountMapping {
    pub(crate) fn new(uri: &str, dir: PathBuf) -> Self {
        let mut uri = uri.to_string();
        if !uri.starts_with('/') {
            uri.insert(0, '/');
        }
        if !uri.ends_with('/') {
            uri.push('/');
        }
        Self { uri, dir }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps a directory-level URI (ending in `/`) plus a file name onto this
    /// mount, or `None` when the URI lies outside the prefix.
    pub(crate) fn map(&self, uri_dir: &str, file_name: &str) -> Option<PathBuf> {
        let rest = uri_dir.strip_prefix(self.uri.as_str())?;
        let mut path = self.join(rest);
        if !file_name.is_empty() {
            path.push(file_name);
        }
        Some(path)
    }

    /// Directory on disk for a URI directory under this mount.
    pub(crate) fn join(&self, rest: &str) -> PathBuf {
        let mut path = self.dir.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        let m = MountMapping::new("static", PathBuf::from("/srv"));
        assert_eq!(m.uri(), "/static/");
    }

    #[test]
    fn maps_nested_paths_under_dir() {
        let m = MountMapping::new("/assets", PathBuf::from("/srv/assets"));
        assert_eq!(
            m.map("/assets/css/", "site.css"),
            Some(PathBuf::from("/srv/assets/css/site.css"))
        );
        assert_eq!(m.map("/other/", "x.css"), None);
    }
}

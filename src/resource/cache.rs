use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::mount::MountMapping;
use super::{DEFAULT_FORBIDDEN, ResourceError};

/// An open, shareable read handle for one file.
///
/// Reads are positional, so concurrent responses streaming the same file never
/// disturb each other's cursor.
#[derive(Debug)]
pub struct CachedResource {
    path: PathBuf,
    file: File,
    len: u64,
    opened_at: SystemTime,
    modified_at: SystemTime,
    last_access: Mutex<Instant>,
}

impl CachedResource {
    fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: meta.len(),
            opened_at: SystemTime::now(),
            modified_at: meta.modified().unwrap_or(UNIX_EPOCH),
            last_access: Mutex::new(Instant::now()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn opened_at(&self) -> SystemTime {
        self.opened_at
    }

    pub fn modified_at(&self) -> SystemTime {
        self.modified_at
    }

    /// Modification time truncated to whole seconds, as HTTP dates carry it.
    pub fn modified_secs(&self) -> u64 {
        self.modified_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Reads up to `buf.len()` bytes starting at `offset`.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset)
        }
    }

    /// Reads one chunk of at most `size` bytes from `offset`. An empty chunk
    /// means end of file.
    pub fn read_chunk(&self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let remaining = self.len.saturating_sub(offset);
        let want = (remaining as usize).min(size);
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }
}

/// Mount mappings plus the cache of open file handles.
///
/// Mounts are registered through `&mut self` before the cache is shared, so
/// the mapping list is fixed once serving starts.
#[derive(Debug)]
pub struct ResourceCache {
    mounts: Vec<MountMapping>,
    forbidden: Vec<String>,
    entries: Mutex<HashMap<PathBuf, Arc<CachedResource>>>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            mounts: Vec::new(),
            forbidden: DEFAULT_FORBIDDEN.iter().map(|s| s.to_string()).collect(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_forbidden(&mut self, forbidden: Vec<String>) {
        self.forbidden = forbidden;
    }

    pub fn forbidden(&self) -> &[String] {
        &self.forbidden
    }

    /// Adds a mount mapping. The directory must exist.
    pub fn register(&mut self, uri_prefix: &str, dir: impl AsRef<Path>) -> Result<(), ResourceError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ResourceError::MissingDirectory(dir.to_path_buf()));
        }
        let dir = dir.canonicalize()?;
        let mount = MountMapping::new(uri_prefix, dir);
        tracing::debug!(uri = mount.uri(), dir = %mount.dir().display(), "Mount registered");
        self.mounts.push(mount);
        Ok(())
    }

    pub fn mounts(&self) -> &[MountMapping] {
        &self.mounts
    }

    fn check_forbidden(&self, uri_path: &str) -> Result<(), ResourceError> {
        if self.forbidden.iter().any(|f| uri_path.contains(f.as_str())) {
            return Err(ResourceError::Forbidden);
        }
        Ok(())
    }

    /// Resolves a URI path to a file path under the first matching mount.
    pub fn resolve(&self, uri_path: &str) -> Result<PathBuf, ResourceError> {
        self.check_forbidden(uri_path)?;

        let split = uri_path.rfind('/').ok_or(ResourceError::NotFound)?;
        let (dir, file_name) = uri_path.split_at(split + 1);

        self.mounts
            .iter()
            .find_map(|m| m.map(dir, file_name))
            .ok_or(ResourceError::NotFound)
    }

    /// True when the URI maps onto an existing regular file that is not a
    /// symlink.
    pub fn exists(&self, uri_path: &str) -> bool {
        let Ok(path) = self.resolve(uri_path) else {
            return false;
        };
        std::fs::symlink_metadata(&path)
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Returns the cached handle for a URI path, opening the file on first
    /// use.
    ///
    /// Missing files map to `NotFound`; files that exist but fail to open map
    /// to `Fault`.
    pub fn lookup(&self, uri_path: &str) -> Result<Arc<CachedResource>, ResourceError> {
        let path = self.resolve(uri_path)?;

        if let Some(existing) = self.entries.lock().get(&path) {
            existing.touch();
            return Ok(existing.clone());
        }

        let opened = match CachedResource::open(&path) {
            Ok(r) => Arc::new(r),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ResourceError::NotFound),
            Err(e) => return Err(ResourceError::Fault(e)),
        };

        // A concurrent lookup may have opened the same path meanwhile; keep
        // whichever entry landed first.
        let mut entries = self.entries.lock();
        let entry = entries.entry(path).or_insert(opened);
        entry.touch();
        Ok(entry.clone())
    }

    /// Like [`lookup`](Self::lookup) but folds every miss into `None`. Only a
    /// forbidden path is reported as an error.
    pub fn get(&self, uri_path: &str) -> Result<Option<Arc<CachedResource>>, ResourceError> {
        match self.lookup(uri_path) {
            Ok(r) => Ok(Some(r)),
            Err(ResourceError::Forbidden) => Err(ResourceError::Forbidden),
            Err(ResourceError::Fault(e)) => {
                tracing::warn!(path = uri_path, error = %e, "Failed to open resource");
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    /// Lists file names under a URI directory.
    ///
    /// `"/docs/"` lists every file; `"/docs/*.html"` filters by a glob on the
    /// last segment.
    pub fn find(&self, path: &str) -> Result<Vec<String>, ResourceError> {
        let (dir, pattern) = match path.rfind('/') {
            Some(i) if is_pattern(&path[i + 1..]) => (&path[..=i], &path[i + 1..]),
            _ => (path, "*"),
        };
        let mut dir = dir.to_string();
        if !dir.ends_with('/') {
            dir.push('/');
        }
        self.check_forbidden(&dir)?;

        let pattern = glob::Pattern::new(pattern)?;

        for mount in &self.mounts {
            if mount.uri() == dir {
                return list_files(mount.dir(), &pattern);
            }
            let Some(rest) = dir.strip_prefix(mount.uri()) else {
                continue;
            };
            let candidate = mount.join(rest);
            if candidate.is_dir() {
                return list_files(&candidate, &pattern);
            }
        }

        Ok(Vec::new())
    }

    /// Drops cached handles that have not been requested for `ttl`. Responses
    /// already streaming an evicted handle keep it alive until they finish.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, r| r.idle_for() < ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "Evicted idle resources");
        }
        evicted
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_pattern(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

fn list_files(dir: &Path, pattern: &glob::Pattern) -> Result<Vec<String>, ResourceError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.matches(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, ResourceCache) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.html"), "a").unwrap();
        fs::write(dir.path().join("docs/b.txt"), "b").unwrap();

        let mut cache = ResourceCache::new();
        cache.register("/", dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn register_rejects_missing_directory() {
        let mut cache = ResourceCache::new();
        let err = cache.register("/", "/definitely/not/here").unwrap_err();
        assert!(matches!(err, ResourceError::MissingDirectory(_)));
    }

    #[test]
    fn resolve_is_rooted_at_mount() {
        let (dir, cache) = fixture();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(cache.resolve("/docs/a.html").unwrap(), root.join("docs").join("a.html"));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let (_dir, cache) = fixture();
        assert!(matches!(cache.resolve("/../etc/passwd"), Err(ResourceError::Forbidden)));
        assert!(matches!(cache.resolve("/c:/windows"), Err(ResourceError::Forbidden)));
    }

    #[test]
    fn lookup_returns_shared_handle() {
        let (_dir, cache) = fixture();
        let first = cache.lookup("/index.html").unwrap();
        let second = cache.lookup("/index.html").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_lookups_share_one_handle() {
        let (_dir, cache) = fixture();
        let start = std::sync::Barrier::new(16);

        let handles: Vec<_> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        start.wait();
                        cache.lookup("/docs/a.html").unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert!(Arc::ptr_eq(&handles[0], &cache.lookup("/docs/a.html").unwrap()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, cache) = fixture();
        assert!(matches!(cache.lookup("/nope.html"), Err(ResourceError::NotFound)));
        assert!(cache.get("/nope.html").unwrap().is_none());
    }

    #[test]
    fn directory_is_not_a_resource() {
        let (_dir, cache) = fixture();
        assert!(cache.get("/docs").unwrap().is_none());
    }

    #[test]
    fn read_chunk_reads_independently() {
        let (_dir, cache) = fixture();
        let r = cache.lookup("/index.html").unwrap();
        assert_eq!(r.read_chunk(0, 4).unwrap(), b"<h1>");
        assert_eq!(r.read_chunk(4, 64).unwrap(), b"home</h1>");
        assert!(r.read_chunk(r.len(), 64).unwrap().is_empty());
    }

    #[test]
    fn find_lists_and_filters() {
        let (_dir, cache) = fixture();
        assert_eq!(cache.find("/docs/").unwrap(), vec!["a.html", "b.txt"]);
        assert_eq!(cache.find("/docs/*.html").unwrap(), vec!["a.html"]);
        assert_eq!(cache.find("/").unwrap(), vec!["index.html"]);
        assert!(matches!(cache.find("/../*"), Err(ResourceError::Forbidden)));
    }

    #[test]
    fn evict_idle_drops_entries() {
        let (_dir, cache) = fixture();
        let held = cache.lookup("/index.html").unwrap();
        assert_eq!(cache.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(cache.evict_idle(Duration::ZERO), 1);
        assert!(cache.is_empty());

        // The evicted handle is still readable by whoever holds it.
        assert_eq!(held.read_chunk(0, 4).unwrap(), b"<h1>");
        let reopened = cache.lookup("/index.html").unwrap();
        assert!(!Arc::ptr_eq(&held, &reopened));
    }

    #[test]
    fn exists_checks_regular_files() {
        let (_dir, cache) = fixture();
        assert!(cache.exists("/docs/a.html"));
        assert!(!cache.exists("/docs/missing.html"));
        assert!(!cache.exists("/../x"));
    }
}

use crate::io::common::loader::ContentCache;
use crate::resolution::url::is_web;
use log::{debug, trace, warn};
use quick_cache::sync::Cache;
use std::fs;
use std::path::{Component, Path, PathBuf};

const KNOWN_URLS_CAPACITY: usize = 1024;
const HTTP_PREFIX: &str = "_http/";

/// Stores retrieved assets below a cache directory, mirroring the url: `https://www.example.com/a/b.proto` ends up in
/// `<directory>/com.example.www/a/b.proto`. Plain `http` urls go below `<directory>/_http/`, so the two schemes never
/// share a file.
pub struct DiskCache {
    directory: PathBuf,
    // urls known to be on disk, so repeated lookups don't stat the file system every time
    known: Cache<String, PathBuf>,
}

impl DiskCache {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        debug!("Asset cache at {}", directory.display());

        Ok(Self {
            directory,
            known: Cache::new(KNOWN_URLS_CAPACITY),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Reverses the host labels and strips the scheme, `http` urls are prefixed with `_http/`.
    pub fn encode_url(url: &str) -> String {
        let (prefix, without_scheme) = match url.split_once("://") {
            Some(("http", rest)) => (HTTP_PREFIX, rest),
            Some((_, rest)) => ("", rest),
            None => ("", url),
        };
        let (host, path) = without_scheme.split_at(without_scheme.find('/').unwrap_or(without_scheme.len()));

        format!("{}{}{}", prefix, host.split('.').rev().collect::<Vec<_>>().join("."), path)
    }

    /// Inverse of [`Self::encode_url`] for `http` and `https` urls.
    pub fn decode_url(encoded: &str) -> String {
        let (scheme, encoded) = match encoded.strip_prefix(HTTP_PREFIX) {
            Some(rest) => ("http", rest),
            None => ("https", encoded),
        };
        let (host, path) = encoded.split_at(encoded.find('/').unwrap_or(encoded.len()));
        format!(
            "{}://{}{}",
            scheme,
            host.split('.').rev().collect::<Vec<_>>().join("."),
            path
        )
    }

    /// `None` for urls that would not end up below the cache directory, e.g. because of `..` segments.
    fn location(&self, url: &str) -> Option<PathBuf> {
        let encoded = Self::encode_url(url);
        let relative = Path::new(&encoded);
        if relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            Some(self.directory.join(relative))
        } else {
            warn!("Refusing to cache {} outside of {}", url, self.directory.display());
            None
        }
    }

    pub fn clear(&self) -> Result<(), std::io::Error> {
        debug!("Clearing asset cache {}", self.directory.display());
        self.known.clear();
        if self.directory.exists() {
            fs::remove_dir_all(&self.directory)?;
        }
        fs::create_dir_all(&self.directory)
    }
}

impl ContentCache for DiskCache {
    fn is_cached(&self, url: &str) -> bool {
        if !is_web(url) {
            return false;
        }

        if self.known.get(url).is_some() {
            return true;
        }

        match self.location(url) {
            Some(location) if location.is_file() => {
                self.known.insert(url.to_string(), location);
                true
            }
            _ => false,
        }
    }

    fn get(&self, url: &str) -> Option<PathBuf> {
        if !self.is_cached(url) {
            return None;
        }
        self.location(url)
    }

    fn save(&self, url: &str, content: &[u8]) -> Result<PathBuf, std::io::Error> {
        let Some(location) = self.location(url) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' does not map to a location inside the cache", url),
            ));
        };

        if self.is_cached(url) {
            trace!("{} is already cached", url);
            return Ok(location);
        }

        if let Some(parent) = location.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&location, content)?;
        trace!("Cached {} ({} bytes) at {}", url, content.len(), location.display());
        self.known.insert(url.to_string(), location.clone());
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encoding() {
        let url = "https://raw.githubusercontent.com/cyberbotics/webots/R2023a/projects/Wheel.proto";
        let encoded = DiskCache::encode_url(url);
        assert_eq!(
            encoded,
            "com.githubusercontent.raw/cyberbotics/webots/R2023a/projects/Wheel.proto"
        );
        assert_eq!(DiskCache::decode_url(&encoded), url);
        assert_eq!(DiskCache::encode_url("https://localhost"), "localhost");

        let plain = "http://example.com/protos/Wheel.proto";
        assert_eq!(DiskCache::encode_url(plain), "_http/com.example/protos/Wheel.proto");
        assert_eq!(DiskCache::decode_url(&DiskCache::encode_url(plain)), plain);
    }

    #[test]
    fn schemes_do_not_share_files() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let cache = DiskCache::new(dir.path())?;

        cache.save("https://example.com/Wheel.proto", b"secure")?;
        assert!(!cache.is_cached("http://example.com/Wheel.proto"));

        let plain = cache.save("http://example.com/Wheel.proto", b"plain")?;
        assert_eq!(fs::read_to_string(plain)?, "plain");
        assert_eq!(
            fs::read_to_string(dir.path().join("com.example/Wheel.proto"))?,
            "secure"
        );
        Ok(())
    }

    #[test]
    fn urls_cannot_escape_the_cache() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let cache = DiskCache::new(dir.path().join("cache"))?;

        for url in ["https://evil.org/../../escaped.proto", "https:///etc/escaped.proto"] {
            let error = cache.save(url, b"x").expect_err("outside of the cache");
            assert_eq!(error.kind(), std::io::ErrorKind::InvalidInput);
            assert!(!cache.is_cached(url));
            assert_eq!(cache.get(url), None);
        }

        assert!(!dir.path().join("escaped.proto").exists());
        Ok(())
    }

    #[test]
    fn save_and_get() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let cache = DiskCache::new(dir.path().join("assets"))?;
        let url = "https://example.com/protos/Wheel.proto";

        assert!(!cache.is_cached(url));
        assert_eq!(cache.get(url), None);

        let location = cache.save(url, b"PROTO Wheel [] {}")?;
        assert_eq!(location, dir.path().join("assets/com.example/protos/Wheel.proto"));
        assert!(cache.is_cached(url));
        assert_eq!(cache.get(url), Some(location.clone()));

        // already cached, the content is not replaced
        cache.save(url, b"something else")?;
        assert_eq!(fs::read_to_string(&location)?, "PROTO Wheel [] {}");

        // a second instance finds it on disk
        let other = DiskCache::new(dir.path().join("assets"))?;
        assert!(other.is_cached(url));

        cache.clear()?;
        assert!(!cache.is_cached(url));
        assert!(cache.directory().exists());
        Ok(())
    }

    #[test]
    fn only_web_urls_are_cached() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let cache = DiskCache::new(dir.path())?;
        assert!(!cache.is_cached("webots://projects/Wheel.proto"));
        assert!(!cache.is_cached("/absolute/Wheel.proto"));
        Ok(())
    }
}

use crate::resolution::reference::Reference;
use crate::resolution::report::{FetchFailure, ScanError};
use std::future::{Future, ready};
use std::path::{Path, PathBuf};

/// The transport for remote references. Bounding the duration of a single fetch is up to the implementation.
pub trait FetchService: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchFailure>> + Send;
}

/// Content cache keyed by url. Has to tolerate concurrent saves of different urls, saving an url that is already
/// present is a no-op.
pub trait ContentCache: Send + Sync {
    fn is_cached(&self, url: &str) -> bool;

    /// The on-disk location of an already cached url.
    fn get(&self, url: &str) -> Option<PathBuf>;

    fn save(&self, url: &str, content: &[u8]) -> Result<PathBuf, std::io::Error>;
}

/// Extracts the references a resolved file declares, in declaration order.
pub trait ScanService: Send + Sync {
    fn declared_references(&self, path: &Path) -> Result<Vec<Reference>, ScanError>;
}

/// Read-only catalog of the prototypes shipped with the application.
pub trait Catalog: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Reference>;
}

/// Serves nothing but what already is in the cache, every remote miss fails.
pub struct OfflineFetcher;

impl FetchService for OfflineFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchFailure>> + Send {
        ready(Err(FetchFailure::Transport {
            url: url.to_string(),
            reason: "not cached and running offline".to_string(),
        }))
    }
}

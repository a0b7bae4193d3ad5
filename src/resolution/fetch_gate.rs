use crate::io::common::loader::{ContentCache, FetchService};
use crate::resolution::report::FetchFailure;
use crate::resolution::url::CanonicalLocation;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, trace};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;

type FetchOutcome = Option<Result<PathBuf, FetchFailure>>;

/// The async boundary between the tree builder and the transport. Local locations are answered right away, cache hits
/// too, and every other remote url is fetched exactly once no matter how many branches ask for it concurrently: the
/// first caller becomes the leader of that url, everyone arriving while the fetch is outstanding subscribes to the
/// leader's outcome.
pub struct FetchGate<F: FetchService> {
    fetcher: F,
    cache: Arc<dyn ContentCache>,
    in_flight: DashMap<String, watch::Receiver<FetchOutcome>>,
    issued: AtomicUsize,
}

enum Role {
    Leader(watch::Sender<FetchOutcome>),
    Waiter(watch::Receiver<FetchOutcome>),
}

/// Removes the in-flight entry once the leader is done, even if its task is dropped half way.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, watch::Receiver<FetchOutcome>>,
    url: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.url);
    }
}

impl<F: FetchService> FetchGate<F> {
    pub fn new(fetcher: F, cache: Arc<dyn ContentCache>) -> Self {
        Self {
            fetcher,
            cache,
            in_flight: DashMap::with_capacity(64),
            issued: AtomicUsize::new(0),
        }
    }

    pub async fn resolve(&self, location: &CanonicalLocation) -> Result<PathBuf, FetchFailure> {
        match location {
            CanonicalLocation::LocalPath(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(FetchFailure::NotFound(path.clone()))
                }
            }
            CanonicalLocation::Missing(raw) => Err(FetchFailure::Missing(raw.clone())),
            CanonicalLocation::Remote(url) => self.resolve_remote(url).await,
        }
    }

    /// Callback flavour of [`Self::resolve`]: `on_done` runs on the runtime once the location is resolved.
    pub fn resolve_then<C>(self: &Arc<Self>, location: CanonicalLocation, on_done: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<PathBuf, FetchFailure>) + Send + 'static,
    {
        let gate = self.clone();
        tokio::spawn(async move {
            let outcome = gate.resolve(&location).await;
            on_done(outcome);
        })
    }

    /// How many fetches have actually been handed to the transport.
    pub fn issued_fetches(&self) -> usize {
        self.issued.load(Ordering::Acquire)
    }

    async fn resolve_remote(&self, url: &str) -> Result<PathBuf, FetchFailure> {
        if let Some(path) = self.cache.get(url) {
            trace!("Cache hit for {}", url);
            return Ok(path);
        }

        // the entry guard must not live across an await
        let role = match self.in_flight.entry(url.to_string()) {
            Entry::Occupied(entry) => Role::Waiter(entry.get().clone()),
            Entry::Vacant(entry) => {
                // raced by a leader that finished in between
                if let Some(path) = self.cache.get(url) {
                    return Ok(path);
                }

                let (sender, receiver) = watch::channel(None);
                entry.insert(receiver);
                Role::Leader(sender)
            }
        };

        match role {
            Role::Leader(sender) => {
                let _guard = InFlightGuard {
                    in_flight: &self.in_flight,
                    url,
                };

                debug!("Fetching {}", url);
                self.issued.fetch_add(1, Ordering::AcqRel);
                let outcome = self.fetch_and_store(url).await;
                sender.send_replace(Some(outcome.clone()));
                outcome
            }
            Role::Waiter(mut receiver) => {
                trace!("Joining the outstanding fetch of {}", url);
                match receiver.wait_for(Option::is_some).await {
                    Ok(outcome) => match &*outcome {
                        Some(outcome) => outcome.clone(),
                        None => Err(FetchFailure::Abandoned(url.to_string())),
                    },
                    // the leader went away without publishing anything
                    Err(_) => Err(FetchFailure::Abandoned(url.to_string())),
                }
            }
        }
    }

    async fn fetch_and_store(&self, url: &str) -> Result<PathBuf, FetchFailure> {
        let content = self.fetcher.fetch(url).await?;
        self.cache.save(url, &content).map_err(|err| FetchFailure::Cache {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cache::DiskCache;
    use std::future::{Future, ready};

    struct StaticFetcher;

    impl FetchService for StaticFetcher {
        fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchFailure>> + Send {
            let outcome = if url.ends_with("Broken.proto") {
                Err(FetchFailure::Transport {
                    url: url.to_string(),
                    reason: "404".to_string(),
                })
            } else {
                Ok(format!("PROTO from {}", url).into_bytes())
            };
            ready(outcome)
        }
    }

    #[tokio::test]
    async fn local_and_missing_locations() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let gate = FetchGate::new(StaticFetcher, Arc::new(DiskCache::new(dir.path().join("cache"))?));

        let existing = dir.path().join("Box.proto");
        std::fs::write(&existing, "")?;
        assert_eq!(gate.resolve(&CanonicalLocation::LocalPath(existing.clone())).await, Ok(existing));

        let absent = dir.path().join("Gone.proto");
        assert_eq!(
            gate.resolve(&CanonicalLocation::LocalPath(absent.clone())).await,
            Err(FetchFailure::NotFound(absent))
        );
        assert_eq!(
            gate.resolve(&CanonicalLocation::Missing("Gone.proto".to_string())).await,
            Err(FetchFailure::Missing("Gone.proto".to_string()))
        );
        assert_eq!(gate.issued_fetches(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn remote_fetches_are_cached() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let cache = Arc::new(DiskCache::new(dir.path())?);
        let gate = Arc::new(FetchGate::new(StaticFetcher, cache.clone()));
        let url = "https://example.com/Wheel.proto";

        let path = gate.resolve(&CanonicalLocation::Remote(url.to_string())).await?;
        assert_eq!(std::fs::read_to_string(&path)?, format!("PROTO from {}", url));
        assert!(cache.is_cached(url));

        let (tx, rx) = tokio::sync::oneshot::channel();
        gate.resolve_then(CanonicalLocation::Remote(url.to_string()), move |outcome| {
            let _ = tx.send(outcome);
        })
        .await?;
        assert_eq!(rx.await?, Ok(path));
        assert_eq!(gate.issued_fetches(), 1);

        let broken = "https://example.com/Broken.proto";
        assert!(matches!(
            gate.resolve(&CanonicalLocation::Remote(broken.to_string())).await,
            Err(FetchFailure::Transport { .. })
        ));
        assert!(!cache.is_cached(broken));
        Ok(())
    }
}

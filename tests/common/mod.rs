#![allow(dead_code)]

use protoscout::io::cache::DiskCache;
use protoscout::io::common::loader::FetchService;
use protoscout::io::files::catalog::ProtoCatalog;
use protoscout::io::files::scanner::ExternProtoScanner;
use protoscout::resolution::engine::{ResolutionEngine, ResolutionReport};
use protoscout::resolution::reference::Reference;
use protoscout::resolution::report::FetchFailure;
use protoscout::settings::ResolverSettings;
use protoscout_files::proto_list::ProtoList;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

/// Serves prototype files from memory. Urls can be held back until they are released.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    inner: Arc<MemoryFetcherInner>,
}

#[derive(Default)]
struct MemoryFetcherInner {
    documents: Mutex<HashMap<String, String>>,
    failures: Mutex<HashSet<String>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn serve(&self, url: &str, content: &str) {
        self.inner
            .documents
            .lock()
            .unwrap()
            .insert(url.to_string(), content.to_string());
    }

    pub fn fail(&self, url: &str) {
        self.inner.failures.lock().unwrap().insert(url.to_string());
    }

    pub fn hold(&self, url: &str) {
        self.inner
            .holds
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(Notify::new()));
    }

    pub fn release(&self, url: &str) {
        if let Some(hold) = self.inner.holds.lock().unwrap().get(url) {
            hold.notify_one();
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests().iter().filter(|request| *request == url).count()
    }
}

impl FetchService for MemoryFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchFailure>> + Send {
        let inner = self.inner.clone();
        let url = url.to_string();

        async move {
            inner.requests.lock().unwrap().push(url.clone());

            let hold = inner.holds.lock().unwrap().get(&url).cloned();
            if let Some(hold) = hold {
                hold.notified().await;
            }

            if inner.failures.lock().unwrap().contains(&url) {
                return Err(FetchFailure::Transport {
                    url,
                    reason: "404 Not Found".to_string(),
                });
            }

            let document = inner.documents.lock().unwrap().get(&url).cloned();
            document.map(String::into_bytes).ok_or(FetchFailure::Transport {
                url,
                reason: "unknown host".to_string(),
            })
        }
    }
}

/// A project directory layout below a temporary directory, plus an engine working on it.
pub struct Fixture {
    pub dir: TempDir,
    pub fetcher: MemoryFetcher,
    pub engine: ResolutionEngine<MemoryFetcher>,
}

impl Fixture {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::with_catalog("<proto-list></proto-list>")
    }

    pub fn with_catalog(xml: &str) -> Result<Self, anyhow::Error> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("project/protos"))?;
        std::fs::create_dir_all(dir.path().join("project/worlds"))?;

        let settings = ResolverSettings::new(
            dir.path().join("install"),
            dir.path().join("project"),
            dir.path().join("project/worlds"),
        );
        let fetcher = MemoryFetcher::default();
        let engine = ResolutionEngine::new(
            &settings,
            fetcher.clone(),
            Arc::new(DiskCache::new(dir.path().join("cache"))?),
            Arc::new(ExternProtoScanner),
            Arc::new(ProtoCatalog::from_list(ProtoList::parse_str(xml)?)),
        );

        Ok(Self { dir, fetcher, engine })
    }

    pub fn worlds(&self) -> PathBuf {
        self.dir.path().join("project/worlds")
    }

    pub fn protos(&self) -> PathBuf {
        self.dir.path().join("project/protos")
    }

    /// Writes a world file declaring `declarations` (one locator each) and returns the reference to load it.
    pub fn world(&self, name: &str, declarations: &[&str]) -> Result<Reference, anyhow::Error> {
        let path = self.worlds().join(format!("{}.wbt", name));
        std::fs::write(&path, document("#VRML_SIM R2023b utf8", declarations, "WorldInfo {\n}"))?;
        Ok(scene(name, &path))
    }

    /// Serves a prototype declaring `declarations` at `url`.
    pub fn remote_proto(&self, url: &str, declarations: &[&str]) {
        let name = url.rsplit('/').next().unwrap_or_default().trim_end_matches(".proto");
        self.fetcher.serve(
            url,
            &document("#VRML_SIM R2023b utf8", declarations, &format!("PROTO {} [\n]\n{{\n}}", name)),
        );
    }
}

pub fn document(header: &str, declarations: &[&str], body: &str) -> String {
    let mut document = format!("{}\n\n", header);
    for declaration in declarations {
        document.push_str(&format!("EXTERNPROTO \"{}\"\n", declaration));
    }
    document.push('\n');
    document.push_str(body);
    document.push('\n');
    document
}

pub fn scene(name: &str, path: &Path) -> Reference {
    Reference::new(name, path.to_string_lossy())
}

pub fn index_names(report: &ResolutionReport) -> Vec<String> {
    report.index.names().into_iter().map(str::to_string).collect()
}

pub fn declared_names(report: &ResolutionReport) -> Vec<String> {
    report.declared.iter().map(|declared| declared.name.clone()).collect()
}

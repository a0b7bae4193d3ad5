use crate::io::common::loader::{Catalog, ContentCache, FetchService, ScanService};
use crate::resolution::fetch_gate::FetchGate;
use crate::resolution::ledger::{DeclaredReference, Ledger, LedgerConflict};
use crate::resolution::reference::Reference;
use crate::resolution::report::{ResolutionError, ResolutionIssue};
use crate::resolution::session_index::SessionIndex;
use crate::resolution::tree::{Generation, TreeBuilder, TreeNode};
use crate::resolution::url::{CanonicalLocation, UrlCanonicalizer};
use crate::settings::ResolverSettings;
use arc_swap::ArcSwap;
use log::{debug, error, info, trace, warn};
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Entry point of the resolution: owns the session index and the ledger of the currently loaded scene and hands out
/// one [`ResolutionHandle`] per request. Cheap to clone, all clones share the same session.
pub struct ResolutionEngine<F: FetchService> {
    shared: Arc<EngineShared<F>>,
}

impl<F: FetchService> Clone for ResolutionEngine<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct EngineShared<F: FetchService> {
    builder: TreeBuilder<F>,
    gate: Arc<FetchGate<F>>,
    canonicalizer: Arc<UrlCanonicalizer>,
    catalog: Arc<dyn Catalog>,
    generation: Arc<AtomicU64>,
    state: Mutex<SessionState>,
    /// What readers see, replaced as a whole whenever a generation settles.
    snapshot: ArcSwap<SessionIndex>,
}

struct SessionState {
    index: SessionIndex,
    ledger: Ledger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    /// A whole scene: resets the session, the root is the scene itself.
    Scene,
    /// A single prototype added to the loaded scene.
    Prototype,
}

/// Everything a settled generation produced.
#[derive(Debug)]
pub struct ResolutionReport {
    pub generation: u64,
    pub index: Arc<SessionIndex>,
    pub declared: Vec<DeclaredReference>,
    pub issues: Vec<ResolutionIssue>,
    pub tree: Arc<TreeNode>,
}

#[derive(Debug)]
pub struct ResolutionHandle {
    generation: u64,
    receiver: oneshot::Receiver<Result<ResolutionReport, ResolutionError>>,
}

impl ResolutionHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `None` if the request has been superseded before it settled.
    pub async fn settled(self) -> Option<Result<ResolutionReport, ResolutionError>> {
        self.receiver.await.ok()
    }
}

impl<F: FetchService> ResolutionEngine<F> {
    pub fn new(
        settings: &ResolverSettings,
        fetcher: F,
        cache: Arc<dyn ContentCache>,
        scanner: Arc<dyn ScanService>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        let canonicalizer = Arc::new(UrlCanonicalizer::new(settings));
        let gate = Arc::new(FetchGate::new(fetcher, cache));

        Self {
            shared: Arc::new(EngineShared {
                builder: TreeBuilder::new(gate.clone(), scanner, canonicalizer.clone()),
                gate,
                catalog,
                generation: Arc::new(AtomicU64::new(0)),
                state: Mutex::new(SessionState {
                    index: SessionIndex::new(),
                    ledger: Ledger::new(canonicalizer.clone()),
                }),
                snapshot: ArcSwap::from_pointee(SessionIndex::new()),
                canonicalizer,
            }),
        }
    }

    /// Starts resolving a scene. The session is reset right away and any request still in flight is superseded: its
    /// handle will never yield a report. `legacy` are bare prototype names of scenes without declarations, they are
    /// looked up in the catalog and resolved as if the scene declared them.
    pub fn begin_resolution(&self, root: Reference, legacy: &[String]) -> Result<ResolutionHandle, ResolutionError> {
        self.check_root(&root, true)?;
        let generation = self.next_generation();
        info!("Resolving {} (generation {})", root, generation.value());

        {
            let mut state = self.shared.state.lock().expect("Session lock poisoned");
            state.index.clear();
            state.ledger.clear();
            self.shared.snapshot.store(Arc::new(SessionIndex::new()));
        }

        let mut issues = vec![];
        let mut extra_children = vec![];
        for name in legacy {
            match self.shared.catalog.lookup(name) {
                Some(reference) => {
                    trace!("Legacy PROTO {} is {}", name, reference.raw_locator);
                    extra_children.push(reference);
                }
                None => issues.push(ResolutionIssue::UnresolvableCatalogEntry { name: name.clone() }),
            }
        }

        Ok(self.spawn_request(RequestKind::Scene, root, extra_children, generation, issues))
    }

    /// Resolves a single prototype and its dependencies into the loaded session, without resetting it. The prototype
    /// itself becomes an index entry and an ephemeral declaration.
    pub fn begin_proto_retrieval(&self, reference: Reference) -> Result<ResolutionHandle, ResolutionError> {
        self.check_root(&reference, false)?;
        let generation = self.next_generation();
        info!("Retrieving {} (generation {})", reference, generation.value());

        Ok(self.spawn_request(RequestKind::Prototype, reference, vec![], generation, vec![]))
    }

    /// Runs `callback` once the request behind `handle` has settled. Superseded requests never call it.
    pub fn on_settled<C>(&self, handle: ResolutionHandle, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(Result<ResolutionReport, ResolutionError>) + Send + 'static,
    {
        tokio::spawn(async move {
            let generation = handle.generation();
            match handle.settled().await {
                Some(outcome) => callback(outcome),
                None => trace!("Generation {} was superseded, not notifying", generation),
            }
        })
    }

    /// The index of the last settled generation.
    pub fn session_index(&self) -> Arc<SessionIndex> {
        self.shared.snapshot.load_full()
    }

    pub fn declare(&self, name: &str, raw_locator: &str, ephemeral: bool) -> Result<(), LedgerConflict> {
        self.shared
            .state
            .lock()
            .expect("Session lock poisoned")
            .ledger
            .declare(name, raw_locator, ephemeral)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.remove_with(name, true)
    }

    pub fn remove_with(&self, name: &str, allow_ephemeral: bool) -> bool {
        self.shared
            .state
            .lock()
            .expect("Session lock poisoned")
            .ledger
            .remove_with(name, allow_ephemeral)
    }

    pub fn update_declaration(&self, name: &str, raw_locator: &str) -> bool {
        self.shared
            .state
            .lock()
            .expect("Session lock poisoned")
            .ledger
            .update(name, raw_locator)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.shared
            .state
            .lock()
            .expect("Session lock poisoned")
            .ledger
            .is_declared(name)
    }

    pub fn list(&self) -> Vec<DeclaredReference> {
        self.shared.state.lock().expect("Session lock poisoned").ledger.list().to_vec()
    }

    /// Where `name` lives: the session first, the catalog second.
    pub fn locate(&self, name: &str) -> Option<CanonicalLocation> {
        if let Some(entry) = self.session_index().get(name) {
            return Some(entry.canonical.clone());
        }

        self.shared
            .catalog
            .lookup(name)
            .map(|reference| self.shared.canonicalizer.canonicalize(&reference.raw_locator))
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// How many remote fetches have been issued over the lifetime of this engine.
    pub fn issued_fetches(&self) -> usize {
        self.shared.gate.issued_fetches()
    }

    fn next_generation(&self) -> Generation {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Generation::new(self.shared.generation.clone(), generation)
    }

    /// Rejects roots that can't possibly be read, before anything of the session is touched. Only scenes have to be on
    /// disk already.
    fn check_root(&self, root: &Reference, must_be_local: bool) -> Result<(), ResolutionError> {
        let unreadable = |reason: String| ResolutionError::RootUnreadable {
            locator: root.raw_locator.clone(),
            reason,
        };

        match self.shared.canonicalizer.canonicalize(&root.raw_locator) {
            CanonicalLocation::LocalPath(path) => {
                File::open(&path).map_err(|err| unreadable(err.to_string()))?;
            }
            CanonicalLocation::Remote(_) if !must_be_local => {}
            CanonicalLocation::Remote(url) => return Err(unreadable(format!("'{}' is not a local file", url))),
            CanonicalLocation::Missing(_) => {
                return Err(unreadable("it cannot be resolved to any known location".to_string()));
            }
        }

        Ok(())
    }

    fn spawn_request(
        &self,
        kind: RequestKind,
        root: Reference,
        extra_children: Vec<Reference>,
        generation: Generation,
        issues: Vec<ResolutionIssue>,
    ) -> ResolutionHandle {
        let (sender, receiver) = oneshot::channel();
        let tree = self.shared.builder.build(root, extra_children, generation.clone());
        let handle = ResolutionHandle {
            generation: generation.value(),
            receiver,
        };

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let Ok(root) = tree.await else {
                debug!("Generation {} was abandoned before its tree settled", generation.value());
                return;
            };

            if let Some(report) = shared.finish(kind, &generation, root, issues) {
                // the caller may have dropped the handle, that's fine
                let _ = sender.send(report);
            }
        });

        handle
    }
}

impl<F: FetchService> EngineShared<F> {
    /// Derives the session from a settled tree. `None` if the generation turned out to be stale.
    fn finish(
        &self,
        kind: RequestKind,
        generation: &Generation,
        root: Arc<TreeNode>,
        mut issues: Vec<ResolutionIssue>,
    ) -> Option<Result<ResolutionReport, ResolutionError>> {
        if !generation.is_current() {
            debug!("Dropping the result of superseded generation {}", generation.value());
            return None;
        }

        debug!("Dependency tree of generation {}:\n{}", generation.value(), root);

        // a root that could not be read has nothing to report, one that fails to scan is reported like any other node
        if let Some(root_error @ ResolutionIssue::FetchFailure { .. }) = root.error() {
            let error = ResolutionError::RootUnreadable {
                locator: root.reference().raw_locator.clone(),
                reason: root_error.to_string(),
            };
            error!("{}", error);
            return Some(Err(error));
        }

        issues.extend(root.failures());

        let (index, declared) = {
            let mut state = self.state.lock().expect("Session lock poisoned");
            // a newer request may have reset the session in the meantime
            if !generation.is_current() {
                debug!("Dropping the result of superseded generation {}", generation.value());
                return None;
            }

            match kind {
                RequestKind::Scene => {
                    let (index, conflicts) = SessionIndex::build(&root, false);
                    issues.extend(conflicts);
                    state.index = index;

                    for child in root.children() {
                        let reference = child.reference();
                        if let Err(conflict) =
                            state
                                .ledger
                                .declare(&reference.name, &reference.raw_locator, reference.importable)
                        {
                            report_conflict(&mut issues, conflict);
                        }
                    }
                }
                RequestKind::Prototype => {
                    let conflicts = state.index.merge_tree(&root, true);
                    issues.extend(conflicts);

                    let reference = root.reference();
                    if root.has_failed() {
                        debug!("Not declaring {}, it could not be scanned", reference);
                    } else if let Err(conflict) =
                        state.ledger.declare(&reference.name, &reference.raw_locator, true)
                    {
                        report_conflict(&mut issues, conflict);
                    }
                }
            }

            let index = Arc::new(state.index.clone());
            self.snapshot.store(index.clone());
            (index, state.ledger.list().to_vec())
        };

        for issue in &issues {
            warn!("{}", issue);
        }
        info!(
            "Generation {} settled: {} PROTO indexed, {} declared, {} issue(s)",
            generation.value(),
            index.len(),
            declared.len(),
            issues.len()
        );

        Some(Ok(ResolutionReport {
            generation: generation.value(),
            index,
            declared,
            issues,
            tree: root,
        }))
    }
}

/// A name the index already reported as conflicting is not reported a second time by the ledger.
fn report_conflict(issues: &mut Vec<ResolutionIssue>, conflict: LedgerConflict) {
    let already_reported = issues
        .iter()
        .any(|issue| matches!(issue, ResolutionIssue::NameConflict { name, .. } if *name == conflict.name));

    if !already_reported {
        issues.push(conflict.into());
    }
}

use crate::io::common::loader::{FetchService, ScanService};
use crate::resolution::fetch_gate::FetchGate;
use crate::resolution::reference::Reference;
use crate::resolution::report::ResolutionIssue;
use crate::resolution::url::{CanonicalLocation, UrlCanonicalizer};
use log::trace;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    FetchPending,
    Expanding,
    Settled,
    /// Terminal, the node still counts as settled for its parent.
    FetchFailed,
}

/// One prototype file of the dependency tree. Children only hold a [`Weak`] to their parent, the tree is owned from
/// the root downwards.
#[derive(Debug)]
pub struct TreeNode {
    reference: Reference,
    canonical: CanonicalLocation,
    depth: usize,
    parent: Weak<TreeNode>,
    /// Canonical locations from the root down to (and including) this node.
    lineage: Vec<CanonicalLocation>,
    local_path: RwLock<Option<PathBuf>>,
    children: RwLock<Vec<Arc<TreeNode>>>,
    error: RwLock<Option<ResolutionIssue>>,
    pending_children: AtomicUsize,
    state: RwLock<NodeState>,
}

impl TreeNode {
    fn root(reference: Reference, canonical: CanonicalLocation) -> Arc<Self> {
        Arc::new(Self {
            lineage: vec![canonical.clone()],
            reference,
            canonical,
            depth: 0,
            parent: Weak::new(),
            local_path: RwLock::new(None),
            children: RwLock::new(vec![]),
            error: RwLock::new(None),
            pending_children: AtomicUsize::new(0),
            state: RwLock::new(NodeState::Created),
        })
    }

    fn child(parent: &Arc<TreeNode>, reference: Reference, canonical: CanonicalLocation) -> Arc<Self> {
        let mut lineage = parent.lineage.clone();
        lineage.push(canonical.clone());

        Arc::new(Self {
            reference,
            canonical,
            depth: parent.depth + 1,
            parent: Arc::downgrade(parent),
            lineage,
            local_path: RwLock::new(None),
            children: RwLock::new(vec![]),
            error: RwLock::new(None),
            pending_children: AtomicUsize::new(0),
            state: RwLock::new(NodeState::Created),
        })
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn canonical(&self) -> &CanonicalLocation {
        &self.canonical
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn parent(&self) -> Option<Arc<TreeNode>> {
        self.parent.upgrade()
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        self.local_path.read().expect("Tree node lock poisoned").clone()
    }

    /// In declaration order.
    pub fn children(&self) -> Vec<Arc<TreeNode>> {
        self.children.read().expect("Tree node lock poisoned").clone()
    }

    pub fn error(&self) -> Option<ResolutionIssue> {
        self.error.read().expect("Tree node lock poisoned").clone()
    }

    pub fn state(&self) -> NodeState {
        *self.state.read().expect("Tree node lock poisoned")
    }

    pub fn pending_children(&self) -> usize {
        self.pending_children.load(Ordering::Acquire)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state(), NodeState::Settled | NodeState::FetchFailed)
    }

    pub fn has_failed(&self) -> bool {
        self.state() == NodeState::FetchFailed
    }

    /// Whether the canonical location of this node already occurs further up its own path.
    fn closes_cycle(&self) -> bool {
        !self.canonical.is_missing() && self.lineage[..self.lineage.len() - 1].contains(&self.canonical)
    }

    /// Visits the node and its descendants in pre-order (node, then children left to right).
    pub fn visit_pre_order<V: FnMut(&TreeNode)>(&self, visitor: &mut V) {
        visitor(self);
        for child in self.children() {
            child.visit_pre_order(visitor);
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit_pre_order(&mut |_| count += 1);
        count
    }

    /// The issues of all failed nodes, in pre-order.
    pub fn failures(&self) -> Vec<ResolutionIssue> {
        let mut failures = vec![];
        self.visit_pre_order(&mut |node| {
            if let Some(error) = node.error() {
                failures.push(error);
            }
        });
        failures
    }

    fn set_state(&self, state: NodeState) {
        *self.state.write().expect("Tree node lock poisoned") = state;
    }

    fn fail(&self, issue: ResolutionIssue) {
        trace!("{} failed: {}", self.reference, issue);
        *self.error.write().expect("Tree node lock poisoned") = Some(issue);
        self.set_state(NodeState::FetchFailed);
    }

    fn fmt_indented(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} [{:?}] {}",
            "  ".repeat(self.depth),
            self.reference.name,
            self.state(),
            self.canonical
        )?;

        if let Some(error) = self.error() {
            write!(f, ": {}", error)?;
        }
        writeln!(f)?;

        for child in self.children() {
            child.fmt_indented(f)?;
        }
        Ok(())
    }
}

impl Display for TreeNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f)
    }
}

/// Identifies one resolution request. Bumping the shared counter makes every older token stale.
#[derive(Debug, Clone)]
pub struct Generation {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl Generation {
    pub fn new(current: Arc<AtomicU64>, generation: u64) -> Self {
        Self { current, generation }
    }

    pub fn value(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

/// Expands a root reference into a [`TreeNode`] tree. Every node is expanded in its own task, so independent branches
/// fetch concurrently; a node settles once its own fetch is done and every child has settled, and the root settling is
/// the one completion signal of the whole tree.
pub struct TreeBuilder<F: FetchService> {
    gate: Arc<FetchGate<F>>,
    scanner: Arc<dyn ScanService>,
    canonicalizer: Arc<UrlCanonicalizer>,
}

struct Expansion<F: FetchService> {
    gate: Arc<FetchGate<F>>,
    scanner: Arc<dyn ScanService>,
    canonicalizer: Arc<UrlCanonicalizer>,
    generation: Generation,
    /// Appended to the children the root declares itself.
    extra_root_children: Vec<Reference>,
    // children only point to their parent weakly, so someone has to keep the root alive until it settles
    root: Arc<TreeNode>,
    done: Mutex<Option<oneshot::Sender<Arc<TreeNode>>>>,
}

impl<F: FetchService> TreeBuilder<F> {
    pub fn new(gate: Arc<FetchGate<F>>, scanner: Arc<dyn ScanService>, canonicalizer: Arc<UrlCanonicalizer>) -> Self {
        Self {
            gate,
            scanner,
            canonicalizer,
        }
    }

    /// Starts expanding `root` on the current runtime. The receiver yields the root once the whole tree has settled.
    /// It is never completed for trees whose generation was superseded before their root could settle.
    pub fn build(
        &self,
        root: Reference,
        extra_root_children: Vec<Reference>,
        generation: Generation,
    ) -> oneshot::Receiver<Arc<TreeNode>> {
        let (sender, receiver) = oneshot::channel();
        let canonical = self.canonicalizer.canonicalize(&root.raw_locator);
        let root = TreeNode::root(root, canonical);

        let expansion = Arc::new(Expansion {
            gate: self.gate.clone(),
            scanner: self.scanner.clone(),
            canonicalizer: self.canonicalizer.clone(),
            generation,
            extra_root_children,
            root: root.clone(),
            done: Mutex::new(Some(sender)),
        });

        spawn_expansion(expansion, root);
        receiver
    }
}

fn spawn_expansion<F: FetchService>(expansion: Arc<Expansion<F>>, node: Arc<TreeNode>) {
    tokio::spawn(async move {
        expand(&expansion, &node).await;
    });
}

async fn expand<F: FetchService>(expansion: &Arc<Expansion<F>>, node: &Arc<TreeNode>) {
    node.set_state(NodeState::FetchPending);
    let path = match expansion.gate.resolve(&node.canonical).await {
        Ok(path) => path,
        Err(failure) => {
            node.fail(ResolutionIssue::FetchFailure {
                name: node.reference.name.clone(),
                failure,
            });
            expansion.settle(node);
            return;
        }
    };

    *node.local_path.write().expect("Tree node lock poisoned") = Some(path.clone());
    if !expansion.generation.is_current() {
        trace!("Generation {} is stale, not expanding {}", expansion.generation.value(), node.reference);
        expansion.settle(node);
        return;
    }

    node.set_state(NodeState::Expanding);
    // a file that can't be scanned declares nothing, the legacy children of the root still get expanded
    let mut references = match expansion.scanner.declared_references(&path) {
        Ok(references) => references,
        Err(err) => {
            node.fail(ResolutionIssue::ParseFailure {
                name: node.reference.name.clone(),
                path,
                reason: err.to_string(),
            });
            vec![]
        }
    };

    if node.is_root() {
        references.extend(expansion.extra_root_children.iter().cloned());
    }

    let children = references
        .into_iter()
        .map(|reference| {
            let canonical = expansion
                .canonicalizer
                .canonicalize_from(&reference.raw_locator, &node.canonical);
            TreeNode::child(node, reference, canonical)
        })
        .collect::<Vec<_>>();

    trace!("{} declares {} children", node.reference, children.len());

    // the count has to be in place before the first child can possibly settle
    node.pending_children.store(children.len(), Ordering::Release);
    *node.children.write().expect("Tree node lock poisoned") = children.clone();

    if children.is_empty() {
        expansion.settle(node);
        return;
    }

    for child in children {
        if child.closes_cycle() {
            child.fail(ResolutionIssue::CycleDetected {
                name: child.reference.name.clone(),
                locator: child.canonical.to_locator(),
            });
            expansion.settle(&child);
        } else {
            spawn_expansion(expansion.clone(), child);
        }
    }
}

impl<F: FetchService> Expansion<F> {
    fn settle(&self, node: &Arc<TreeNode>) {
        if !node.has_failed() {
            node.set_state(NodeState::Settled);
        }

        match node.parent() {
            Some(parent) => {
                if parent.pending_children.fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.settle(&parent);
                }
            }
            None => {
                trace!("Tree of {} settled", node.reference);
                if let Some(sender) = self.done.lock().expect("Completion lock poisoned").take() {
                    // nobody listening anymore if the request was superseded
                    let _ = sender.send(self.root.clone());
                }
            }
        }
    }
}

//! This module resolves the prototype (PROTO) files a scene depends on into a flat name to location index.
//!
//! A scene declares its prototypes with `EXTERNPROTO` lines, and every prototype file may declare further ones, so
//! before a scene can be loaded the whole dependency tree has to be discovered and every file has to be on disk. The
//! [`tree::TreeBuilder`] does that discovery: each node is canonicalized ([`url::UrlCanonicalizer`]), handed to the
//! [`fetch_gate::FetchGate`] and, once its file is available, scanned for its own declarations, which become its
//! children. Every node expands in its own task, so independent branches download concurrently.
//!
//! Completion works by counting: a node stores the number of its children before any of them is spawned and every
//! child that settles decrements that counter. Whoever brings it to zero settles the parent in turn, and the root
//! settling is the one signal the [`engine::ResolutionEngine`] waits for. A failed branch settles like any other, it
//! just carries its [`report::ResolutionIssue`] along and contributes nothing to the index.
//!
//! The gate makes sure every url is fetched once: the first branch asking for it does the fetch, every branch arriving
//! while it is outstanding waits for the same outcome.
//!
//! Once the tree settled, the [`session_index::SessionIndex`] is derived from it in pre-order (first occurrence of a
//! name wins, a different location for the same name is reported) and the [`ledger::Ledger`] is seeded with the
//! top-level declarations of the scene.
//!
//! Note: A new request supersedes the one in flight by bumping the generation counter. The old tree still runs to
//! completion (no fetch is cancelled), but it is not expanded further and its outcome is dropped.
//!
//! Note: A prototype that, directly or indirectly, declares itself is not fetched a second time. The node closing the
//! cycle fails with [`report::ResolutionIssue::CycleDetected`] instead.
pub mod engine;
pub mod fetch_gate;
pub mod ledger;
pub mod reference;
pub mod report;
pub mod session_index;
pub mod tree;
pub mod url;

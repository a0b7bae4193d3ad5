use crate::resolution::report::ResolutionIssue;
use crate::resolution::url::UrlCanonicalizer;
use log::{debug, trace};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredReference {
    pub name: String,
    pub raw_locator: String,
    /// Not confirmed for persistence yet, e.g. inserted interactively or only declared as importable.
    pub ephemeral: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{name}' cannot be declared as EXTERNPROTO because another reference for this PROTO already exists: '{existing}'")]
pub struct LedgerConflict {
    pub name: String,
    pub existing: String,
    pub attempted: String,
}

impl From<LedgerConflict> for ResolutionIssue {
    fn from(conflict: LedgerConflict) -> Self {
        ResolutionIssue::NameConflict {
            name: conflict.name,
            existing: conflict.existing,
            attempted: conflict.attempted,
        }
    }
}

/// The ordered list of top-level references a scene remembers declaring. The order is the order they will be written
/// back in. Locators are compared by their canonical form, so `Wheel.proto` and `./Wheel.proto` are the same entry.
#[derive(Debug)]
pub struct Ledger {
    canonicalizer: Arc<UrlCanonicalizer>,
    entries: Vec<DeclaredReference>,
}

impl Ledger {
    pub fn new(canonicalizer: Arc<UrlCanonicalizer>) -> Self {
        Self {
            canonicalizer,
            entries: vec![],
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    /// Re-declaring an existing name with an equal locator is a no-op, apart from promoting an ephemeral entry when the
    /// new declaration is persistent. A different locator is rejected and the ledger stays unchanged.
    pub fn declare(&mut self, name: &str, raw_locator: &str, ephemeral: bool) -> Result<(), LedgerConflict> {
        let Some(position) = self.position(name) else {
            trace!("Declaring {} as {} (ephemeral: {})", name, raw_locator, ephemeral);
            self.entries.push(DeclaredReference {
                name: name.to_string(),
                raw_locator: raw_locator.to_string(),
                ephemeral,
            });
            return Ok(());
        };

        let existing = &mut self.entries[position];
        if self.canonicalizer.canonicalize(&existing.raw_locator) != self.canonicalizer.canonicalize(raw_locator) {
            return Err(LedgerConflict {
                name: name.to_string(),
                existing: existing.raw_locator.clone(),
                attempted: raw_locator.to_string(),
            });
        }

        if existing.ephemeral && !ephemeral {
            debug!("{} is now a persistent declaration", name);
            existing.ephemeral = false;
        }

        Ok(())
    }

    /// Removes `name` regardless of it being ephemeral. `false` if it wasn't declared.
    pub fn remove(&mut self, name: &str) -> bool {
        self.remove_with(name, true)
    }

    /// Like [`Self::remove`], but ephemeral entries are kept unless `allow_ephemeral` is set.
    pub fn remove_with(&mut self, name: &str, allow_ephemeral: bool) -> bool {
        match self.position(name) {
            Some(position) if allow_ephemeral || !self.entries[position].ephemeral => {
                self.entries.remove(position);
                true
            }
            _ => false,
        }
    }

    /// Points an existing declaration somewhere else, keeping its position. `false` if `name` isn't declared.
    pub fn update(&mut self, name: &str, raw_locator: &str) -> bool {
        match self.position(name) {
            Some(position) => {
                self.entries[position].raw_locator = raw_locator.to_string();
                true
            }
            None => false,
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&DeclaredReference> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// In declaration order.
    pub fn list(&self) -> &[DeclaredReference] {
        &self.entries
    }

    /// The entries that would be persisted, in declaration order.
    pub fn persistent(&self) -> impl Iterator<Item = &DeclaredReference> {
        self.entries.iter().filter(|entry| !entry.ephemeral)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ResolverSettings;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(UrlCanonicalizer::new(&ResolverSettings::new(
            "/sim",
            "/project",
            "/project/worlds",
        ))))
    }

    #[test]
    fn declare_is_idempotent() {
        let mut ledger = ledger();
        ledger.declare("Wheel", "webots://protos/Wheel.proto", false).expect("first declaration");
        ledger.declare("Car", "https://example.com/Car.proto", false).expect("first declaration");
        assert_eq!(ledger.declare("Wheel", "webots://protos/./Wheel.proto", false), Ok(()));

        assert_eq!(ledger.len(), 2);
        let names = ledger.list().iter().map(|entry| entry.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Wheel", "Car"]);
        // the first spelling is kept
        assert_eq!(ledger.list()[0].raw_locator, "webots://protos/Wheel.proto");
    }

    #[test]
    fn conflicting_declaration_is_rejected() {
        let mut ledger = ledger();
        ledger.declare("Wheel", "webots://protos/Wheel.proto", false).expect("first declaration");
        let before = ledger.list().to_vec();

        let conflict = ledger
            .declare("Wheel", "https://example.com/Wheel.proto", true)
            .expect_err("different origin");
        assert_eq!(conflict.existing, "webots://protos/Wheel.proto");
        assert_eq!(conflict.attempted, "https://example.com/Wheel.proto");
        assert_eq!(ledger.list(), before.as_slice());

        let issue: ResolutionIssue = conflict.into();
        assert_eq!(issue.name(), "Wheel");
    }

    #[test]
    fn ephemeral_entries() {
        let mut ledger = ledger();
        ledger.declare("Lamp", "webots://protos/Lamp.proto", true).expect("first declaration");
        ledger.declare("Desk", "webots://protos/Desk.proto", false).expect("first declaration");
        assert_eq!(ledger.persistent().count(), 1);

        assert!(!ledger.remove_with("Lamp", false));
        assert!(ledger.is_declared("Lamp"));

        ledger.declare("Lamp", "webots://protos/Lamp.proto", false).expect("same origin");
        assert_eq!(ledger.get("Lamp").map(|entry| entry.ephemeral), Some(false));
        assert!(ledger.remove_with("Lamp", false));
        assert!(!ledger.remove("Lamp"));
    }

    #[test]
    fn update_keeps_the_position() {
        let mut ledger = ledger();
        ledger.declare("A", "webots://protos/A.proto", false).expect("first declaration");
        ledger.declare("B", "webots://protos/B.proto", false).expect("first declaration");

        assert!(ledger.update("A", "https://example.com/A.proto"));
        assert!(!ledger.update("C", "https://example.com/C.proto"));
        assert_eq!(ledger.list()[0].raw_locator, "https://example.com/A.proto");

        ledger.clear();
        assert!(ledger.is_empty());
    }
}

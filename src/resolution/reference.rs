use std::fmt::{Display, Formatter};

/// A declared name plus the locator exactly as it was written in the declaring file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub name: String,
    pub raw_locator: String,
    /// Declared for later insertion only (`IMPORTABLE EXTERNPROTO`); such entries stay ephemeral in the ledger.
    pub importable: bool,
}

impl Reference {
    pub fn new(name: impl Into<String>, raw_locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_locator: raw_locator.into(),
            importable: false,
        }
    }

    pub fn importable(name: impl Into<String>, raw_locator: impl Into<String>) -> Self {
        Self {
            importable: true,
            ..Self::new(name, raw_locator)
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.raw_locator)
    }
}

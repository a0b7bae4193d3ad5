use std::path::PathBuf;
use thiserror::Error;

/// Why a single reference could not be turned into a file on disk. `Clone`, as one outcome is handed to every caller
/// that was queued on the same url.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("'{url}' could not be retrieved: {reason}")]
    Transport { url: String, reason: String },

    #[error("'{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("'{0}' cannot be resolved to any known location")]
    Missing(String),

    #[error("'{url}' was retrieved but could not be stored in the cache: {reason}")]
    Cache { url: String, reason: String },

    #[error("The retrieval of '{0}' was abandoned before it completed")]
    Abandoned(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Parser(#[from] protoscout_files::ParserError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Everything that can go wrong for a single node or name. Collected, logged and handed to the caller alongside the
/// (possibly partial) session index; none of these abort a resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionIssue {
    #[error("PROTO '{name}' could not be retrieved: {failure}")]
    FetchFailure { name: String, failure: FetchFailure },

    #[error("PROTO '{name}' ({}) could not be scanned for its references: {reason}", .path.display())]
    ParseFailure {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error(
        "'{name}' cannot be used for '{attempted}' because another reference for this PROTO already exists: '{existing}'"
    )]
    NameConflict {
        name: String,
        existing: String,
        attempted: String,
    },

    #[error("PROTO '{name}' is not a known catalog PROTO, the backwards compatibility mechanism may fail")]
    UnresolvableCatalogEntry { name: String },

    #[error("PROTO '{name}' ({locator}) depends on itself")]
    CycleDetected { name: String, locator: String },
}

impl ResolutionIssue {
    pub fn name(&self) -> &str {
        match self {
            ResolutionIssue::FetchFailure { name, .. }
            | ResolutionIssue::ParseFailure { name, .. }
            | ResolutionIssue::NameConflict { name, .. }
            | ResolutionIssue::UnresolvableCatalogEntry { name }
            | ResolutionIssue::CycleDetected { name, .. } => name,
        }
    }
}

/// The only failures that leave the caller without any index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("File '{locator}' is not readable: {reason}")]
    RootUnreadable { locator: String, reason: String },
}

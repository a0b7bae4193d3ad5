use crate::settings::ResolverSettings;
use log::trace;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

/// Prefix of locators that point into the application's own install tree.
pub const PACKAGE_SCHEME: &str = "webots://";
const WEB_SCHEMES: [&str; 2] = ["https://", "http://"];

const TEXTURE_SUFFIXES: [&str; 3] = ["png", "jpg", "jpeg"];
const MESH_SUFFIXES: [&str; 3] = ["obj", "stl", "dae"];

/// The normalized, comparable form of a locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalLocation {
    Remote(String),
    LocalPath(PathBuf),
    /// Carries the locator as it was given.
    Missing(String),
}

impl CanonicalLocation {
    /// A locator that canonicalizes back to `self`.
    pub fn to_locator(&self) -> String {
        match self {
            CanonicalLocation::Remote(url) => url.clone(),
            CanonicalLocation::LocalPath(path) => path.to_string_lossy().to_string(),
            CanonicalLocation::Missing(raw) => raw.clone(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CanonicalLocation::Missing(_))
    }
}

impl Display for CanonicalLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CanonicalLocation::Remote(url) => write!(f, "{}", url),
            CanonicalLocation::LocalPath(path) => write!(f, "{}", path.display()),
            CanonicalLocation::Missing(raw) => write!(f, "<missing: {}>", raw),
        }
    }
}

pub fn is_web(url: &str) -> bool {
    WEB_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

pub fn is_package(url: &str) -> bool {
    url.starts_with(PACKAGE_SCHEME)
}

/// Lexically collapses `.` and `..`, the file system is not consulted. `..` never climbs above the root.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }

    cleaned
}

/// Resolves `relative` against the url of the file that declared it, as a browser would.
pub fn join_url(base: &str, relative: &str) -> String {
    let (scheme, rest) = base.split_once("://").unwrap_or(("https", base));
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));

    let mut segments = vec![];
    push_segments(&mut segments, path);
    segments.pop(); // the declaring file itself
    push_segments(&mut segments, relative);

    format!("{}://{}/{}", scheme, host, segments.join("/"))
}

/// Collapses `.` and `..` in the path of an url. `..` never climbs above the host.
pub fn clean_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));

    let mut segments = vec![];
    push_segments(&mut segments, path);
    if segments.is_empty() {
        format!("{}://{}", scheme, host)
    } else {
        format!("{}://{}/{}", scheme, host, segments.join("/"))
    }
}

fn push_segments<'a>(segments: &mut Vec<&'a str>, path: &'a str) {
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
}

/// Turns raw locators into [`CanonicalLocation`]s. Deterministic and side effect free apart from the existence checks
/// of rule 4, so the same instance is used for resolution and for the ambiguity checks of the index and the ledger.
#[derive(Debug, Clone)]
pub struct UrlCanonicalizer {
    install_root: PathBuf,
    /// In order: the project's prototype directory, then the scene directory.
    search_roots: [PathBuf; 2],
    missing_texture: PathBuf,
    missing_mesh: PathBuf,
}

impl UrlCanonicalizer {
    pub fn new(settings: &ResolverSettings) -> Self {
        Self {
            install_root: settings.install_root.clone(),
            search_roots: [settings.protos_dir(), settings.scene_dir.clone()],
            missing_texture: settings.missing_texture(),
            missing_mesh: settings.missing_mesh(),
        }
    }

    pub fn canonicalize(&self, raw_locator: &str) -> CanonicalLocation {
        // use cross-platform forward slashes
        let url = raw_locator.replace('\\', "/");

        if url.is_empty() {
            return self.missing(raw_locator);
        }

        if is_web(&url) {
            return CanonicalLocation::Remote(clean_url(&url));
        }

        if Path::new(&url).is_absolute() {
            return CanonicalLocation::LocalPath(clean_path(Path::new(&url)));
        }

        if let Some(package_relative) = url.strip_prefix(PACKAGE_SCHEME) {
            return CanonicalLocation::LocalPath(clean_path(&self.install_root.join(package_relative)));
        }

        for root in &self.search_roots {
            let candidate = clean_path(&root.join(&url));
            if candidate.exists() {
                return CanonicalLocation::LocalPath(candidate);
            }
        }

        trace!("{} is neither in {:?}", raw_locator, self.search_roots);
        self.missing(raw_locator)
    }

    /// Like [`Self::canonicalize`], but relative locators are first tried next to the declaring file: on disk for
    /// local parents, joined onto the url for remote ones.
    pub fn canonicalize_from(&self, raw_locator: &str, parent: &CanonicalLocation) -> CanonicalLocation {
        let url = raw_locator.replace('\\', "/");
        if url.is_empty() || is_web(&url) || is_package(&url) || Path::new(&url).is_absolute() {
            return self.canonicalize(raw_locator);
        }

        match parent {
            CanonicalLocation::Remote(base) => return CanonicalLocation::Remote(join_url(base, &url)),
            CanonicalLocation::LocalPath(path) => {
                if let Some(directory) = path.parent() {
                    let candidate = clean_path(&directory.join(&url));
                    if candidate.exists() {
                        return CanonicalLocation::LocalPath(candidate);
                    }
                }
            }
            CanonicalLocation::Missing(_) => {}
        }

        self.canonicalize(raw_locator)
    }

    /// Images and meshes degrade to placeholders, everything else stays missing.
    fn missing(&self, raw_locator: &str) -> CanonicalLocation {
        let suffix = raw_locator
            .rsplit_once('.')
            .map(|(_, suffix)| suffix.to_ascii_lowercase())
            .unwrap_or_default();

        if TEXTURE_SUFFIXES.contains(&suffix.as_str()) {
            CanonicalLocation::LocalPath(self.missing_texture.clone())
        } else if MESH_SUFFIXES.contains(&suffix.as_str()) {
            CanonicalLocation::LocalPath(self.missing_mesh.clone())
        } else {
            CanonicalLocation::Missing(raw_locator.to_string())
        }
    }
}

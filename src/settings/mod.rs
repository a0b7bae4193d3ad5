use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "protoscout")]
#[command(version)]
#[command(about = "Resolves, retrieves and indexes the PROTO dependencies of a simulation world")]
pub struct CliArgs {
    /// Root of the application install tree, `webots://` urls are resolved against it.
    #[arg(long, env = "PROTOSCOUT_HOME", default_value_t = default_install_root())]
    pub install_root: String,

    /// Project directory, its `protos` sub directory is searched for relative references.
    /// Defaults to the parent of the directory containing the world file.
    #[arg(long, env = "PROTOSCOUT_PROJECT")]
    pub project_dir: Option<String>,

    #[arg(long, env = "PROTOSCOUT_CACHE_DIR", default_value_t = default_cache_dir())]
    pub cache_dir: String,

    /// Defaults to `<install-root>/resources/proto-list.xml`.
    #[arg(long, env = "PROTOSCOUT_CATALOG")]
    pub catalog: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    pub fn catalog_path(&self) -> PathBuf {
        match &self.catalog {
            Some(catalog) => PathBuf::from(catalog),
            None => default_catalog(Path::new(&self.install_root)),
        }
    }
}

/// The catalog shipped with the install tree.
pub fn default_catalog(install_root: &Path) -> PathBuf {
    install_root.join("resources").join("proto-list.xml")
}

pub fn default_install_root() -> String {
    std::env::current_dir()
        .expect("Can't read current working directory!")
        .to_string_lossy()
        .to_string()
}

pub fn default_cache_dir() -> String {
    std::env::current_dir()
        .expect("Can't read current working directory!")
        .join("_cache")
        .to_string_lossy()
        .to_string()
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve all the PROTO a world file depends on and print the resulting session index.
    Resolve {
        scene: String,
        /// Bare PROTO names used by worlds that predate EXTERNPROTO declarations.
        #[arg(long, value_delimiter = ',')]
        legacy: Vec<String>,
    },
    /// Print the references a single world or PROTO file declares.
    Scan { file: String },
    /// Look a PROTO name up in the catalog.
    Lookup { name: String },
}

/// Where things live for one loaded scene. Everything the canonicalizer needs, nothing else.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub install_root: PathBuf,
    pub project_dir: PathBuf,
    pub scene_dir: PathBuf,
}

impl ResolverSettings {
    pub fn new(install_root: impl Into<PathBuf>, project_dir: impl Into<PathBuf>, scene_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            project_dir: project_dir.into(),
            scene_dir: scene_dir.into(),
        }
    }

    /// Derives the directories from the command line and the world file that is about to be loaded.
    pub fn from_args(args: &CliArgs, scene: &Path) -> Self {
        let scene = std::path::absolute(scene).unwrap_or_else(|_| scene.to_path_buf());
        let scene_dir = scene
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let project_dir = match &args.project_dir {
            Some(project_dir) => PathBuf::from(project_dir),
            // worlds live in <project>/worlds
            None => scene_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| scene_dir.clone()),
        };

        Self::new(&args.install_root, project_dir, scene_dir)
    }

    pub fn protos_dir(&self) -> PathBuf {
        self.project_dir.join("protos")
    }

    pub fn missing_texture(&self) -> PathBuf {
        self.install_root
            .join("resources")
            .join("images")
            .join("missing_texture.png")
    }

    pub fn missing_mesh(&self) -> PathBuf {
        self.install_root
            .join("resources")
            .join("meshes")
            .join("missing_mesh.obj")
    }
}

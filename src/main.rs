use anyhow::{Context, bail};
use clap::Parser;
use itertools::Itertools;
use protoscout::io::cache::DiskCache;
use protoscout::io::common::loader::{OfflineFetcher, ScanService};
use protoscout::io::files::catalog::ProtoCatalog;
use protoscout::io::files::scanner::ExternProtoScanner;
use protoscout::resolution::engine::{ResolutionEngine, ResolutionReport};
use protoscout::resolution::reference::Reference;
use protoscout::settings::{CliArgs, Command, ResolverSettings};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    match &args.command {
        Command::Resolve { scene, legacy } => resolve(&args, Path::new(scene), legacy).await,
        Command::Scan { file } => {
            let references = ExternProtoScanner
                .declared_references(Path::new(file))
                .with_context(|| format!("Scanning {}", file))?;

            for reference in references {
                let marker = if reference.importable { " (importable)" } else { "" };
                println!("{}{}", reference, marker);
            }
            Ok(())
        }
        Command::Lookup { name } => {
            let catalog = ProtoCatalog::load(&args.catalog_path())
                .with_context(|| format!("Loading the catalog {}", args.catalog_path().display()))?;

            let Some(entry) = catalog.info(name) else {
                bail!("{} is not a catalog PROTO", name);
            };

            println!("{}: {}", entry.name, entry.url);
            if let Some(base_type) = &entry.base_type {
                println!("  base type: {}", base_type);
            }
            if let Some(license) = &entry.license {
                println!("  license: {}", license);
            }
            let tags = entry.tags();
            if !tags.is_empty() {
                println!("  tags: {}", tags.iter().join(", "));
            }
            if let Some(description) = entry.description_text() {
                println!("  {}", description);
            }
            Ok(())
        }
    }
}

async fn resolve(args: &CliArgs, scene: &Path, legacy: &[String]) -> Result<(), anyhow::Error> {
    let scene = std::path::absolute(scene).context("Locating the world file")?;
    let settings = ResolverSettings::from_args(args, &scene);
    let cache = DiskCache::new(&args.cache_dir).context("Creating the asset cache")?;

    let catalog = match ProtoCatalog::load(&args.catalog_path()) {
        Ok(catalog) => catalog,
        Err(err) => {
            log::warn!(
                "No catalog at {} ({}), legacy PROTO names can't be resolved",
                args.catalog_path().display(),
                err
            );
            ProtoCatalog::default()
        }
    };

    let engine = ResolutionEngine::new(
        &settings,
        OfflineFetcher,
        Arc::new(cache),
        Arc::new(ExternProtoScanner),
        Arc::new(catalog),
    );

    let name = scene
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let root = Reference::new(name, scene.to_string_lossy());

    let handle = engine.begin_resolution(root, legacy)?;
    match handle.settled().await {
        Some(report) => print_report(&report?),
        None => bail!("The resolution was superseded"),
    }

    Ok(())
}

fn print_report(report: &ResolutionReport) {
    println!("Session index ({} PROTO):", report.index.len());
    for (name, entry) in report.index.iter() {
        match &entry.local_path {
            Some(path) => println!("  {} -> {}", name, path.display()),
            None => println!("  {} -> {}", name, entry.canonical),
        }
    }

    println!("Declared:");
    for declared in &report.declared {
        let marker = if declared.ephemeral { " (ephemeral)" } else { "" };
        println!("  {} {}{}", declared.name, declared.raw_locator, marker);
    }

    if !report.issues.is_empty() {
        println!("Issues:");
        for issue in &report.issues {
            println!("  {}", issue);
        }
    }
}

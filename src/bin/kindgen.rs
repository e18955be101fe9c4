//! Kind Generator CLI
//!
//! Loads pre-parsed app manifests and runs the generator pipeline over them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kind_schemas::codegen::{
    filter, CrdGenerator, FsWriter, Generator, KindSelector, ManifestGenerator, Pipeline, RoutesGenerator,
};
use kind_schemas::conversion::wire_manifest;
use kind_schemas::{AppManifest, CodegenConfig, Encoding, ManifestCache};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "kindgen")]
#[command(about = "Compile multi-version kind schemas into CRDs, manifests and conversion routes")]
struct Cli {
    /// Config file (defaults to kindgen.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate every artifact for the manifests under a directory
    Generate {
        /// Directory of app manifests (*.json, *.yaml)
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Document encoding: json or yaml (overrides config)
        #[arg(short, long)]
        format: Option<Encoding>,
        /// Kinds to generate, e.g. "Issue,boards.example.dev/*"
        #[arg(short, long, default_value = "*")]
        selector: String,
    },

    /// Show hub, priority and routes of every kind
    Versions {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the synthesized schema of one kind version
    Schema {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        kind: String,
        #[arg(short = 'V', long)]
        version: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = CodegenConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Generate {
            input,
            output,
            format,
            selector,
        } => generate(&config, &input, output, format, &selector),
        Commands::Versions { input } => versions(&config, &input),
        Commands::Schema { input, kind, version } => schema(&input, &kind, &version),
    }
}

fn generate(
    config: &CodegenConfig,
    input: &Path,
    output: Option<PathBuf>,
    format: Option<Encoding>,
    selector: &str,
) -> Result<()> {
    let selector = KindSelector::parse(selector).with_context(|| format!("invalid selector {:?}", selector))?;
    let manifests: Vec<AppManifest> = load_manifests(input)?
        .iter()
        .map(|m| selector.select_manifest(m))
        .collect();

    let encoding = format.unwrap_or(config.output.encoding);
    let preferred = config.conversion.preferred_map();
    let cache = Arc::new(ManifestCache::new());

    let pipeline = Pipeline::new()
        .with(filter(
            Generator::one_to_many(CrdGenerator::new(cache.clone(), encoding).with_preferred(preferred.clone())),
            |m: &AppManifest| !m.kinds.is_empty(),
        ))
        .with(filter(
            Generator::one_to_one(
                ManifestGenerator::new(cache, encoding).with_api_version(config.manifest.api_version.clone()),
            ),
            |m: &AppManifest| !m.kinds.is_empty(),
        ))
        .with(Generator::many_to_one(RoutesGenerator::new(encoding).with_preferred(preferred)))
        .with_collision_policy(config.pipeline.collision_policy);

    let root = output.unwrap_or_else(|| config.output_dir());
    let mut writer = FsWriter::new(&root)
        .with_prefix(config.output.path_prefix.clone())
        .with_checksums(config.output.write_checksums);

    let artifacts = pipeline.run_and_commit(&manifests, &mut writer)?;

    println!("Generated {} artifacts in {}", artifacts.len(), root.display());
    for artifact in artifacts.iter() {
        println!("  {}  ({})", artifact.path, artifact.generators.join(", "));
    }
    for collision in artifacts.collisions() {
        println!("  ! {} claimed by {}", collision.path, collision.generators.join(", "));
    }
    Ok(())
}

fn versions(config: &CodegenConfig, input: &Path) -> Result<()> {
    let preferred = config.conversion.preferred_map();
    for manifest in load_manifests(input)? {
        println!("{}", manifest.app_name);
        for (kind, graph) in wire_manifest(&manifest, &preferred) {
            match graph {
                Ok(graph) => {
                    println!("  {} (hub {})", kind, graph.hub);
                    println!("    priority: {}", graph.priority.join(", "));
                    for route in graph.routes() {
                        println!("    {} -> {} [{}]", route.from, route.to, route.direction);
                    }
                }
                Err(e) => println!("  {}: {}", kind, e),
            }
        }
    }
    Ok(())
}

fn schema(input: &Path, kind: &str, version: &str) -> Result<()> {
    let cache = ManifestCache::new();
    let manifests = load_manifests(input)?;
    let Some(manifest) = manifests.iter().find(|m| m.kind(kind).is_some()) else {
        bail!("kind {} not found under {}", kind, input.display());
    };
    let synth = cache.kind_version_schema(manifest, kind, version)?;
    println!("{}", serde_json::to_string_pretty(&synth.schema)?);
    Ok(())
}

/// Every app manifest under `dir`, sorted by path
fn load_manifests(dir: &Path) -> Result<Vec<AppManifest>> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "json" | "yaml" | "yml"))
        })
        .collect();
    paths.sort();

    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let manifest: AppManifest = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        };
        manifests.push(manifest);
    }

    info!(dir = %dir.display(), manifests = manifests.len(), "loaded manifests");
    Ok(manifests)
}

use clap::{Parser, Subcommand, ValueEnum};
use cli::{ImageReport, Manifest};
use color_eyre::eyre::{Result, eyre};
use section::{
    CompositionPolicy, LockScope, MeshIsolation, Orchestrator, ResultCache, SectionConfig,
    SpadeMeshBackend, WorkerCommand,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Composition {
    Primary,
    PrimaryWithHoles,
    EvenOdd,
}

impl From<Composition> for CompositionPolicy {
    fn from(value: Composition) -> Self {
        match value {
            Composition::Primary => Self::Primary,
            Composition::PrimaryWithHoles => Self::PrimaryWithHoles,
            Composition::EvenOdd => Self::EvenOdd,
        }
    }
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Image files to analyse
    images: Vec<PathBuf>,
    /// Manifest (.toml or .json) listing images and their configuration
    #[arg(short, long, conflicts_with = "config")]
    manifest: Option<PathBuf>,
    /// Section configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Physical width of the section bounding box
    #[arg(long)]
    bbox_x: Option<f64>,
    /// Physical height of the section bounding box
    #[arg(long)]
    bbox_y: Option<f64>,
    /// Maximum element edge length
    #[arg(long)]
    mesh_size: Option<f64>,
    /// Extrude the mesh to this depth
    #[arg(long)]
    extrude: Option<f64>,
    /// Skeleton components below this pixel count are noise
    #[arg(long)]
    min_pixels: Option<u32>,
    /// Corners turning less than this many degrees are merged
    #[arg(long)]
    corner_angle: Option<f64>,
    #[arg(long, value_enum)]
    composition: Option<Composition>,
    /// Mesh in a child process that is killed on timeout
    #[arg(long)]
    isolate: bool,
    /// Mesh generation time limit in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Persist results in this directory
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,
    #[arg(long)]
    no_cache: bool,
    /// Hold the mesh lock for the whole job instead of just meshing
    #[arg(long)]
    lock_job: bool,
    /// Write one GeoJSON outline per image into this directory
    #[arg(long)]
    geojson_dir: Option<PathBuf>,
    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute section properties for one or more images
    Analyze(AnalyzeArgs),
    /// Print the JSON schema of the configuration file
    Schema {
        /// Schema of the batch manifest instead
        #[arg(long)]
        manifest: bool,
    },
    /// Serve one mesh request on stdin/stdout
    #[command(hide = true)]
    MeshWorker,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // stdout carries reports and the worker protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => analyze(args).await?,
        Commands::Schema { manifest } => {
            let schema = if manifest {
                schemars::schema_for!(Manifest)
            } else {
                SectionConfig::schema()
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::MeshWorker => {
            section::worker::serve(
                std::io::stdin().lock(),
                std::io::stdout().lock(),
                &SpadeMeshBackend::default(),
            )?;
        }
    }

    Ok(())
}

fn load_config(args: &AnalyzeArgs) -> Result<(SectionConfig, Vec<PathBuf>, Option<PathBuf>)> {
    let mut images = args.images.clone();
    let mut geojson_dir = args.geojson_dir.clone();
    let mut config = match (&args.manifest, &args.config) {
        (Some(path), _) => {
            let manifest = Manifest::from_file(path)?;
            images.extend(manifest.resolve_images(path));
            geojson_dir = geojson_dir.or(manifest.geojson_dir.map(PathBuf::from));
            manifest.config
        }
        (None, Some(path)) => SectionConfig::from_file(path)?,
        (None, None) => SectionConfig::default(),
    };

    if let Some(value) = args.bbox_x {
        config.bbox_x = value;
    }
    if let Some(value) = args.bbox_y {
        config.bbox_y = value;
    }
    if let Some(value) = args.mesh_size {
        config.mesh_size = value;
    }
    if args.extrude.is_some() {
        config.extrude = args.extrude;
    }
    if let Some(value) = args.min_pixels {
        config.minimum_connected_pixels = value;
    }
    if let Some(value) = args.corner_angle {
        config.minimum_corner_angle = value;
    }
    if let Some(value) = args.composition {
        config.composition = value.into();
    }
    config.validate()?;

    if images.is_empty() {
        return Err(eyre!("No images given; pass image paths or --manifest"));
    }
    Ok((config, images, geojson_dir))
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let (config, images, geojson_dir) = load_config(&args)?;

    let mut builder = Orchestrator::builder();
    if args.isolate {
        let worker = WorkerCommand::new(std::env::current_exe()?).arg("mesh-worker");
        builder = builder.isolation(MeshIsolation::Subprocess(worker));
    }
    if let Some(ms) = args.timeout_ms {
        builder = builder.mesh_timeout(Duration::from_millis(ms));
    }
    if args.lock_job {
        builder = builder.lock_scope(LockScope::Job);
    }
    builder = match (&args.cache_dir, args.no_cache) {
        (Some(dir), _) => builder.cache(ResultCache::with_dir(dir)?),
        (None, true) => builder.without_cache(),
        (None, false) => builder,
    };
    let orchestrator = Arc::new(builder.build());

    if let Some(dir) = &geojson_dir {
        std::fs::create_dir_all(dir)?;
    }
    info!("Analysing {} image(s)", images.len());

    let mut tasks = JoinSet::new();
    for (index, path) in images.iter().cloned().enumerate() {
        let orchestrator = Arc::clone(&orchestrator);
        let config = config.clone();
        let geojson_dir = geojson_dir.clone();
        tasks.spawn(async move {
            let report = analyze_one(&orchestrator, &path, &config, geojson_dir.as_deref()).await;
            (index, report)
        });
    }

    let mut reports: Vec<Option<ImageReport>> = vec![None; images.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, report) = joined?;
        reports[index] = Some(report?);
    }
    let reports: Vec<ImageReport> = reports.into_iter().flatten().collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        let blocks: Vec<String> = reports.iter().map(ImageReport::render_text).collect();
        println!("{}", blocks.join("\n\n"));
    }

    let failed = reports.iter().filter(|report| !report.is_success()).count();
    if failed > 0 {
        return Err(eyre!("{} of {} image(s) failed", failed, reports.len()));
    }
    info!("✅ Analysed {} image(s)", reports.len());
    Ok(())
}

async fn analyze_one(
    orchestrator: &Orchestrator,
    path: &Path,
    config: &SectionConfig,
    geojson_dir: Option<&Path>,
) -> Result<ImageReport> {
    let payload = tokio::fs::read(path).await?;
    let outcome = orchestrator.process_upload(payload, config).await;

    if let (Some(dir), Some(section)) = (geojson_dir, &outcome.section) {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("section");
        let target = dir.join(format!("{stem}.geojson"));
        if let Err(e) = section.save_geojson(&target) {
            error!("Failed to write {}: {}", target.display(), e);
        }
    }
    Ok(ImageReport::new(path, &outcome))
}

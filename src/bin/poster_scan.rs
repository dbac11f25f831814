use clap::{Args, Parser, Subcommand};
use image::ImageReader;
use poster_scan::box_mapping::BoxMappingConfig;
use poster_scan::camera::{FrameSource, ImageFolderCamera, acquire_camera};
use poster_scan::catalog::CatalogMode;
use poster_scan::catalog_builder::write_catalog;
use poster_scan::matcher::Norm;
use poster_scan::orb::OrbExtractor;
use poster_scan::presentation::{ConsoleSink, Status, StatusSink};
use poster_scan::scan_loop::{CyclePolicy, ScanLoop};
use poster_scan::session::{CycleError, ScannerConfig, Session};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Parser)]
#[command(version, about, author)]
struct PscanCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// scanner configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// catalog file path or http(s) URL
    #[arg(long)]
    catalog: Option<String>,

    /// report "not recognized" for scores at or above this value (e.g. 500)
    #[arg(long)]
    cutoff: Option<f32>,

    /// put every poster in this box
    #[arg(long, conflicts_with = "box_table")]
    box_label: Option<String>,

    /// JSON object mapping poster id to box label
    #[arg(long)]
    box_table: Option<PathBuf>,

    /// refuse catalogs with malformed reference matrices
    #[arg(long)]
    strict: bool,

    /// distance between descriptor rows; float catalogs need l2
    #[arg(long, value_enum)]
    norm: Option<Norm>,
}

impl CommonArgs {
    fn resolve(&self) -> Result<ScannerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ScannerConfig::from_json_file(path)?,
            None => ScannerConfig::default(),
        };
        if let Some(catalog) = &self.catalog {
            config.catalog = catalog.clone();
        }
        if self.cutoff.is_some() {
            config.recognition_cutoff = self.cutoff;
        }
        if let Some(label) = &self.box_label {
            config.boxes = BoxMappingConfig::Uniform {
                label: label.clone(),
            };
        }
        if let Some(table) = &self.box_table {
            config.boxes = BoxMappingConfig::table_from_json(table)?;
        }
        if self.strict {
            config.catalog_mode = CatalogMode::Strict;
        }
        if let Some(norm) = self.norm {
            config.norm = norm;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a camera and show the best-matching poster and its box
    Scan {
        #[command(flatten)]
        common: CommonArgs,

        /// camera frame folder; `environment/` and `user/` subfolders select a facing
        #[arg(long)]
        frames: PathBuf,

        /// milliseconds between scans
        #[arg(long)]
        interval_ms: Option<u64>,

        /// `serialized` skips a tick while the previous scan is still running
        #[arg(long, value_enum)]
        policy: Option<CyclePolicy>,

        /// loop over the frames forever
        #[arg(long)]
        repeat: bool,

        /// stop after this many scans
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Identify the poster in each image
    Identify {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Build a feature catalog from a folder of poster images
    BuildCatalog {
        /// `<poster_id>/*.jpg` folders or `<poster_id>.jpg` files
        posters: PathBuf,

        #[arg(short, long, default_value = "poster_features.json")]
        output: PathBuf,

        /// scanner configuration JSON, for the ORB settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = PscanCli::parse();
    match cli.command {
        Commands::Scan {
            common,
            frames,
            interval_ms,
            policy,
            repeat,
            max_cycles,
        } => {
            let mut config = common.resolve()?;
            if let Some(ms) = interval_ms {
                config.interval_ms = ms;
            }
            if let Some(policy) = policy {
                config.cycle_policy = policy;
            }
            config.repeat_frames |= repeat;
            if max_cycles.is_some() {
                config.max_cycles = max_cycles;
            }
            scan(&config, &frames).await
        }
        Commands::Identify { common, images } => identify(&common.resolve()?, &images).await,
        Commands::BuildCatalog {
            posters,
            output,
            config,
        } => {
            let config = match config {
                Some(path) => ScannerConfig::from_json_file(&path)?,
                None => ScannerConfig::default(),
            };
            let extractor = OrbExtractor::new(config.orb)?;
            let now = Instant::now();
            let count = write_catalog(&posters, &extractor, &output)?;
            println!(
                "wrote {} posters to {} in {:.3} sec",
                count,
                output.display(),
                now.elapsed().as_secs_f64()
            );
            Ok(())
        }
    }
}

async fn scan(config: &ScannerConfig, frames: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut sink: Box<dyn StatusSink> = Box::new(ConsoleSink::new());
    let session = Arc::new(Session::initialize(config, sink.as_mut()).await?);

    let repeat = config.repeat_frames;
    let acquired = acquire_camera(|constraints| {
        ImageFolderCamera::open(frames, constraints, repeat)
            .map(|camera| Box::new(camera) as Box<dyn FrameSource>)
    });
    let acquired = match acquired {
        Ok(acquired) => acquired,
        Err(e) => {
            sink.alert("Camera access is required to use this app.");
            return Err(e.into());
        }
    };
    log::info!("camera: {}", acquired.source.describe());
    sink.show(&Status::CameraReady {
        fallback: acquired.fallback,
    });

    let sink = Arc::new(Mutex::new(sink));
    let summary = ScanLoop::new(session, acquired.source, sink, config.interval())
        .with_policy(config.cycle_policy)
        .with_max_cycles(config.max_cycles)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    log::info!(
        "{} scans ({} recognized, {} failed, {} ticks skipped)",
        summary.cycles_completed,
        summary.recognized,
        summary.failed,
        summary.ticks_skipped
    );
    Ok(())
}

async fn identify(
    config: &ScannerConfig,
    images: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut sink = ConsoleSink::new();
    let session = Session::initialize(config, &mut sink).await?;
    drop(sink);
    for path in images {
        let img = match ImageReader::open(path).map(|r| r.decode()) {
            Ok(Ok(img)) => img.to_luma8(),
            Ok(Err(e)) => {
                println!("{}: {}", path.display(), Status::Error(e.to_string()));
                continue;
            }
            Err(e) => {
                println!("{}: {}", path.display(), Status::Error(e.to_string()));
                continue;
            }
        };
        let status = match session.identify(&img) {
            Ok(outcome) => Status::Outcome(outcome),
            Err(CycleError::NoFeatures) => Status::NoFeatures,
            Err(e) => Status::CycleFailed(e.to_string()),
        };
        println!("{}: {}", path.display(), status);
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use iiif_engine::config::{self, IiifConfig};
use iiif_engine::imaging::{EngineKind, Image, Transformation, split_request};
use iiif_engine::output::{self, BatchOutcome, TransformReport};
use iiif_engine::profile::{Level, Profile};
use iiif_engine::source::DiskSource;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "iiif-engine")]
#[command(about = "IIIF Image API transformations from the command line")]
#[command(long_about = "\
IIIF Image API transformations from the command line

A request is an identifier followed by the four IIIF parameters:

  {identifier}/{region}/{size}/{rotation}/{quality}.{format}

  region    full | square | x,y,w,h | pct:x,y,w,h
  size      max | full | w, | ,h | pct:n | w,h | !w,h   (prefix ^ to allow upscaling)
  rotation  n | !n   (degrees clockwise; ! mirrors first)
  quality   default | color | gray | bitonal | dither | primitive:mode,iterations,alpha
  format    jpg | png | gif | webp | tif

Identifiers are paths relative to the source directory.

Run 'iiif-engine gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (stock defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured graphics engine
    #[arg(long, global = true)]
    engine: Option<EngineKind>,

    /// Override the configured source image directory
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply one transformation to one image
    Transform {
        /// Image identifier, relative to the source directory
        identifier: String,
        /// region/size/rotation/quality.format
        params: String,
        /// Write the result here (describe only when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the IIIF info document for an image
    Info {
        identifier: String,
        /// Base URL the image is served under
        #[arg(long, default_value = "http://localhost:8080")]
        endpoint: String,
        /// Print the raw info.json instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Run every request in a file (one full request path per line)
    Batch {
        file: PathBuf,
        /// Directory for results (describe only when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iiif_engine=info".into()),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match &cli.command {
        Command::Transform {
            identifier,
            params,
            output: dest,
        } => {
            let (config, source) = setup(&cli)?;
            let report = run_request(&config, &source, identifier, params, dest.as_deref())?;
            output::print_transform_output(&report);
        }
        Command::Info {
            identifier,
            endpoint,
            json,
        } => {
            let (config, source) = setup(&cli)?;
            let image = Image::new(&config, &source, identifier)?;
            let profile = Profile::new(endpoint, &image, &Level::default())?;
            if *json {
                println!("{}", profile.to_json()?);
            } else {
                output::print_info_output(identifier, &profile);
            }
        }
        Command::Batch { file, output: dest } => {
            let (config, source) = setup(&cli)?;
            let content = std::fs::read_to_string(file)?;
            let requests: Vec<&str> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .collect();
            if let Some(dir) = dest {
                std::fs::create_dir_all(dir)?;
            }

            init_thread_pool(&config.processing);
            info!(requests = requests.len(), engine = %config.graphics.engine, "batch");

            let outcomes: Vec<BatchOutcome> = requests
                .par_iter()
                .enumerate()
                .map(|(i, line)| run_batch_line(&config, &source, i, line, dest.as_deref()))
                .collect();
            output::print_batch_output(&outcomes);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config file and apply command-line overrides.
fn setup(cli: &Cli) -> Result<(IiifConfig, DiskSource), BoxError> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(engine) = cli.engine {
        config.graphics.engine = engine;
    }
    if let Some(dir) = &cli.source_dir {
        config.images.source_root = dir.display().to_string();
    }
    config.validate()?;
    let source = DiskSource::new(&config.images.source_root);
    Ok((config, source))
}

/// Load, transform and optionally write one image.
fn run_request(
    config: &IiifConfig,
    source: &DiskSource,
    identifier: &str,
    params: &str,
    output: Option<&Path>,
) -> Result<TransformReport, BoxError> {
    let transformation = Transformation::from_path(params)?;
    let mut image = Image::new(config, source, identifier)?;
    let result = image.transform(&transformation)?;
    let body = image.body()?;
    let dimensions = image.dimensions()?;

    if let Some(path) = output {
        std::fs::write(path, &body)?;
    }

    Ok(TransformReport {
        identifier: identifier.to_string(),
        request: transformation.to_string(),
        engine: image.engine_kind(),
        dimensions,
        content_type: image.content_type().to_string(),
        bytes: body.len(),
        animated: result.is_animated_output,
        output: output.map(Path::to_path_buf),
    })
}

fn run_batch_line(
    config: &IiifConfig,
    source: &DiskSource,
    index: usize,
    line: &str,
    out_dir: Option<&Path>,
) -> BatchOutcome {
    let Some((identifier, params)) = split_request(line) else {
        return BatchOutcome::Failed {
            request: line.to_string(),
            error: "expected identifier/region/size/rotation/quality.format".to_string(),
        };
    };
    let path = out_dir.map(|dir| dir.join(batch_file_name(index, identifier, params)));

    match run_request(config, source, identifier, params, path.as_deref()) {
        Ok(report) => BatchOutcome::Done(report),
        Err(e) => {
            warn!(request = line, error = %e, "request failed");
            BatchOutcome::Failed {
                request: format!("{} {}", identifier, params),
                error: e.to_string(),
            }
        }
    }
}

/// `007-scans_cat.png` for the seventh line requesting `scans/cat.jpg` as png.
fn batch_file_name(index: usize, identifier: &str, params: &str) -> String {
    let stem = Path::new(identifier)
        .with_extension("")
        .to_string_lossy()
        .replace(['/', '\\'], "_");
    let ext = params.rsplit_once('.').map_or("out", |(_, ext)| ext);
    format!("{:03}-{}.{}", index + 1, stem, ext)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use gridmoji::FrameSource as _;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gridmoji", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split an image or video into a pack of 512x512 emoji tiles.
    Split(SplitArgs),
    /// Print what the decoder sees in a media file.
    Probe(ProbeArgs),
    /// Inspect or clean a persisted artifact cache.
    Cache {
        #[command(subcommand)]
        cmd: CacheCommand,
    },
}

#[derive(Parser, Debug)]
struct SplitArgs {
    /// Input image or video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Grid as COLUMNSxROWS, each in 1..=20.
    #[arg(long)]
    grid: gridmoji::GridSpec,

    /// How the frame is reshaped to the grid's aspect ratio.
    #[arg(long, value_enum, default_value_t = MethodChoice::Pad)]
    method: MethodChoice,

    /// Enhancement level applied to each tile.
    #[arg(long, value_enum, default_value_t = QualityChoice::Medium)]
    quality: QualityChoice,

    /// Key out a uniform background into transparency.
    #[arg(long)]
    remove_background: bool,

    /// Job deadline override.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Pipeline config JSON. `GRIDMOJI_*` environment overrides apply on top.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for the pack.
    #[arg(long)]
    out: PathBuf,

    /// Pack name. Defaults to the input file stem.
    #[arg(long)]
    name: Option<String>,

    /// Also zip the pack, with a README, to this path.
    #[arg(long)]
    zip: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input image or video.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Summarize the entries in a cache directory.
    Stats {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Delete entries, optionally only those older than a given age.
    Purge {
        #[arg(long)]
        dir: PathBuf,

        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodChoice {
    Pad,
    Stretch,
    Crop,
}

impl From<MethodChoice> for gridmoji::AdaptationMethod {
    fn from(v: MethodChoice) -> Self {
        match v {
            MethodChoice::Pad => Self::Pad,
            MethodChoice::Stretch => Self::Stretch,
            MethodChoice::Crop => Self::Crop,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QualityChoice {
    Low,
    Medium,
    High,
}

impl From<QualityChoice> for gridmoji::QualityLevel {
    fn from(v: QualityChoice) -> Self {
        match v {
            QualityChoice::Low => Self::Low,
            QualityChoice::Medium => Self::Medium,
            QualityChoice::High => Self::High,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Split(args) => cmd_split(args),
        Command::Probe(args) => cmd_probe(args),
        Command::Cache { cmd } => match cmd {
            CacheCommand::Stats { dir } => cmd_cache_stats(&dir),
            CacheCommand::Purge {
                dir,
                older_than_secs,
            } => cmd_cache_purge(&dir, older_than_secs),
        },
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<gridmoji::PipelineConfig> {
    let mut cfg = match path {
        Some(p) => gridmoji::PipelineConfig::from_json_file(p)?,
        None => gridmoji::PipelineConfig::default(),
    };
    cfg.apply_env_overrides()?;
    // One-shot process: no need for a background sweeper.
    cfg.cache.sweep_interval_secs = None;
    Ok(cfg)
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read input '{}'", path.display()))
}

fn cmd_split(args: SplitArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let source = read_input(&args.in_path)?;

    let opts = gridmoji::JobOptions::new(args.grid, args.method.into(), args.quality.into())
        .with_background_removal(args.remove_background);
    let mut req = gridmoji::JobRequest::new(source, opts);
    if let Some(secs) = args.timeout_secs {
        req = req.with_timeout(Duration::from_secs(secs));
    }

    let pipeline = gridmoji::Pipeline::new(cfg)?;
    let out = pipeline.run(&req);
    pipeline.shutdown();
    let out = out?;

    let name = args.name.unwrap_or_else(|| {
        args.in_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let manifest = gridmoji::write_pack(&args.out, &name, args.grid, out.artifacts())?;
    if let Some(archive) = &args.zip {
        gridmoji::write_pack_archive(&args.out, &manifest, archive)?;
        eprintln!("archived pack to {}", archive.display());
    }

    eprintln!(
        "wrote {} {} emoji(s) to {} (fingerprint {}{})",
        manifest.emoji_count,
        manifest.kind,
        args.out.display(),
        out.fingerprint,
        if out.cache_hit { ", cached" } else { "" }
    );
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let bytes = read_input(&args.in_path)?;
    let report = match gridmoji::decode(&bytes)? {
        gridmoji::DecodedMedia::Image(frame) => serde_json::json!({
            "kind": "image",
            "width": frame.width,
            "height": frame.height,
            "channels": frame.channels,
            "bytes": bytes.len(),
        }),
        gridmoji::DecodedMedia::Video(video) => serde_json::json!({
            "kind": "video",
            "info": video.info(),
            "bytes": bytes.len(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_cache_stats(dir: &Path) -> anyhow::Result<()> {
    let store = gridmoji::DiskStore::open(dir)?;
    let entries = store.enumerate()?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let expired = entries.iter().filter(|e| e.expires_at <= now).count();
    let report = serde_json::json!({
        "dir": dir.display().to_string(),
        "entries": entries.len(),
        "expired": expired,
        "bytes": entries.iter().map(|e| e.bytes).sum::<u64>(),
        "oldest_created_at": entries.first().map(|e| e.created_at),
        "newest_created_at": entries.last().map(|e| e.created_at),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_cache_purge(dir: &Path, older_than_secs: Option<u64>) -> anyhow::Result<()> {
    let store = gridmoji::DiskStore::open(dir)?;
    let removed = match older_than_secs {
        Some(secs) => store.purge_older_than(Duration::from_secs(secs), SystemTime::now())?,
        None => store.purge_all()?,
    };
    eprintln!(
        "purged {removed} entr{} from {}",
        if removed == 1 { "y" } else { "ies" },
        dir.display()
    );
    Ok(())
}

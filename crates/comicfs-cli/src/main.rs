//! comicfs command-line host.
//!
//! Browses a comicfs tree without mounting it:
//!
//!   comicfs --base-dir ~/comics ls /series
//!   comicfs --base-dir ~/comics stat /series/vol1.cbz/page01.webp.png
//!   comicfs --base-dir ~/comics cat /series/vol1.cbz/page01.webp.png > page01.png
//!   comicfs --config comicfs.toml tree /

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use comicfs_kernel::{ComicFsConfig, ComicMount, FilesystemRegistry};

/// Read-only overlay filesystem for comic book archives.
#[derive(Parser, Debug)]
#[command(name = "comicfs")]
#[command(about = "Browse directories with comic archives expanded in place")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to mirror (overrides the config file)
    #[arg(short, long)]
    base_dir: Option<PathBuf>,

    /// Container extension; repeat to set several (overrides the config file)
    #[arg(long = "container-ext", value_name = "EXT")]
    container_exts: Vec<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: PathBuf,
        /// Show inode, mode and size
        #[arg(short, long)]
        long: bool,
    },
    /// Print attributes of a path
    Stat { path: PathBuf },
    /// Write a file's content to stdout
    Cat { path: PathBuf },
    /// Recursively list a directory, descending into archives
    Tree {
        #[arg(default_value = "/")]
        path: PathBuf,
        /// Maximum depth
        #[arg(short, long)]
        depth: Option<usize>,
    },
}

/// Flags > config file > defaults.
fn load_config(args: &Args) -> Result<ComicFsConfig> {
    let mut config = match &args.config {
        Some(path) => ComicFsConfig::load(path)?,
        None => ComicFsConfig::default(),
    };
    if let Some(base_dir) = &args.base_dir {
        config = config.with_base_dir(base_dir);
    }
    if !args.container_exts.is_empty() {
        config = config.with_container_extensions(args.container_exts.iter().cloned());
    }
    if let Some(level) = &args.log_level {
        config = config.with_log_level(level);
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.log_level);

    let registry = FilesystemRegistry::from_config(&config)
        .with_context(|| format!("failed to set up {}", config.base_dir.display()))?;
    let mount = ComicMount::new(Arc::new(registry));

    let mut out = std::io::stdout().lock();
    let result = match &args.command {
        Command::Ls { path, long } => commands::ls(&mount, path, *long, &mut out).await,
        Command::Stat { path } => commands::stat(&mount, path, &mut out).await,
        Command::Cat { path } => commands::cat(&mount, path, &mut out).await,
        Command::Tree { path, depth } => commands::tree(&mount, path, *depth, &mut out).await,
    };

    mount.registry().shutdown();
    result
}

//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use lotus_core::config::{LotusConfig, MalformedRangePolicy};
use lotus_core::storage::{AccessPolicy, AllowAll, FileLibrary, PrivateVideos};
use tracing::{info, warn};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Serve(ServeArgs),
    /// List the videos found in a media directory
    List {
        /// Directory to scan
        media_dir: PathBuf,
    },
}

/// Flags for `lotus serve`. Unset flags fall back to `LOTUS_*` variables, then defaults.
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Directory scanned for video files
    #[arg(short, long)]
    pub media_dir: Option<PathBuf>,
    /// Serve a file under a chosen id, as `ID=PATH` (repeatable)
    #[arg(long = "video", value_parser = parse_assignment)]
    pub videos: Vec<(String, String)>,
    /// Restrict a video to one bearer token, as `ID=TOKEN` (repeatable)
    #[arg(long = "private", value_parser = parse_assignment)]
    pub private: Vec<(String, String)>,
    /// Bytes read from storage per chunk
    #[arg(long)]
    pub read_buffer_size: Option<usize>,
    /// Seconds a storage read may stall before the transfer is aborted
    #[arg(long)]
    pub idle_timeout: Option<u64>,
    /// Largest window served for open-ended `bytes=N-` requests
    #[arg(long)]
    pub open_range_cap: Option<u64>,
    /// Treatment of unparsable Range headers
    #[arg(long, value_enum)]
    pub malformed_range: Option<MalformedRangePolicy>,
    /// Answer denied requests with 403 instead of 404
    #[arg(long)]
    pub expose_denied: bool,
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Serve(args) => serve(args).await,
        Commands::List { media_dir } => list_videos(&media_dir).await,
    }
}

/// Start the streaming server
///
/// # Errors
/// - Invalid configuration, unreadable media directory or bind failure
pub async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = LotusConfig::from_env();
    apply_overrides(&mut config, &args);
    config.validate()?;

    let library = FileLibrary::new();
    if let Some(dir) = &config.library.media_dir {
        let count = library
            .scan_directory(dir)
            .await
            .with_context(|| format!("Failed to scan media directory {}", dir.display()))?;
        info!("Found {} video files in {}", count, dir.display());
    }
    for (id, path) in &args.videos {
        library
            .register(id.as_str(), path)
            .await
            .with_context(|| format!("Failed to register {path} as {id}"))?;
    }
    if library.is_empty() {
        warn!("No videos registered; every stream request will return 404");
    }

    let policy: Arc<dyn AccessPolicy> = if args.private.is_empty() {
        Arc::new(AllowAll)
    } else {
        let private = PrivateVideos::new();
        for (id, token) in &args.private {
            private.restrict(id.as_str(), token.as_str());
        }
        Arc::new(private)
    };

    lotus_web::run_server(config, Arc::new(library), policy).await?;
    Ok(())
}

/// List videos below a directory with their stream ids
///
/// # Errors
/// - Directory could not be scanned
pub async fn list_videos(media_dir: &Path) -> Result<()> {
    let library = FileLibrary::new();
    library
        .scan_directory(media_dir)
        .await
        .with_context(|| format!("Failed to scan {}", media_dir.display()))?;

    if library.is_empty() {
        println!("No video files found in {}", media_dir.display());
        return Ok(());
    }

    println!("{:<18} {:>12}  Title", "ID", "Size (MB)");
    println!("{:-<60}", "");
    for entry in library.entries() {
        println!(
            "{:<18} {:>12.2}  {}",
            entry.id,
            entry.size as f64 / 1_048_576.0,
            entry.title
        );
    }
    Ok(())
}

fn apply_overrides(config: &mut LotusConfig, args: &ServeArgs) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = &args.media_dir {
        config.library.media_dir = Some(dir.clone());
    }
    if let Some(size) = args.read_buffer_size {
        config.streaming.read_buffer_size = size;
    }
    if let Some(seconds) = args.idle_timeout {
        config.streaming.idle_timeout = std::time::Duration::from_secs(seconds);
    }
    if let Some(cap) = args.open_range_cap {
        config.streaming.open_range_cap = Some(cap);
    }
    if let Some(policy) = args.malformed_range {
        config.streaming.malformed_range_policy = policy;
    }
    if args.expose_denied {
        config.streaming.hide_denied = false;
    }
}

fn parse_assignment(value: &str) -> Result<(String, String)> {
    let Some((key, rest)) = value.split_once('=') else {
        bail!("expected KEY=VALUE, got {value}");
    };
    if key.is_empty() || rest.is_empty() {
        bail!("expected KEY=VALUE, got {value}");
    }
    Ok((key.to_string(), rest.to_string()))
}

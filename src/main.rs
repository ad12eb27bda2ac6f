mod cli;

use vidsplit::{config, processor::JobProcessor, server, state};
use vidsplit_av::{
    segment, EncodingProfile, FfmpegBackend, MediaBackend, SegmentEvent,
    SegmentExecutor,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File under `segments_dir` holding job history when persistence is on.
const STATE_FILE: &str = "vidsplit-state.json";

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;
    config::ensure_directories(&config)?;

    tracing::info!("Starting vidsplit server");
    tracing::info!(
        "Uploads in {:?}, segments in {:?}",
        config.storage.upload_dir,
        config.storage.segments_dir
    );

    let backend = FfmpegBackend::discover(
        config.tools.ffmpeg_path.as_deref(),
        config.tools.ffprobe_path.as_deref(),
    )
    .context("ffmpeg and ffprobe are required to split videos")?
    .with_segment_timeout(config.segmenting.segment_timeout());
    tracing::info!(
        "Using ffmpeg at {:?}, ffprobe at {:?}",
        backend.ffmpeg_path(),
        backend.ffprobe_path()
    );

    let state_path = config
        .jobs
        .persist
        .then(|| config.storage.segments_dir.join(STATE_FILE));
    let state = state::AppState::with_history_size(state_path, config.jobs.history_size);
    let config = Arc::new(config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    let processor = JobProcessor::new(
        state.clone(),
        config.clone(),
        Arc::new(backend) as Arc<dyn MediaBackend>,
        shutdown_rx,
    );
    let processor_handle = tokio::spawn(processor.run());

    let server_result = server::start_server(config, state).await;

    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(()).await;
    let _ = processor_handle.await;

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidsplit=trace,vidsplit_av=trace,vidsplit_common=debug,tower_http=debug".to_string()
        } else {
            "vidsplit=debug,vidsplit_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Split {
            input,
            duration,
            output,
            json,
        } => split_file(&input, duration, output, json, cli.config.as_deref()),
        Commands::Plan {
            total,
            duration,
            json,
        } => show_plan(total, duration, json, cli.config.as_deref()),
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidsplit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn segment_secs(duration: Option<i64>, config: &config::Config) -> Result<u32> {
    match duration {
        Some(secs) => Ok(segment::validate_segment_secs(secs)?),
        None => Ok(config.segmenting.default_segment_secs),
    }
}

fn split_file(
    input: &Path,
    duration: Option<i64>,
    output: Option<PathBuf>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let secs = segment_secs(duration, &config)?;

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let output_dir = output.unwrap_or_else(|| {
        config
            .storage
            .segments_dir
            .join(vidsplit_common::paths::base_name(input))
    });

    let backend = FfmpegBackend::discover(
        config.tools.ffmpeg_path.as_deref(),
        config.tools.ffprobe_path.as_deref(),
    )?
    .with_segment_timeout(config.segmenting.segment_timeout());
    let profile: EncodingProfile = config.segmenting.profile();

    tracing::info!("Splitting {:?} into {}s segments", input, secs);

    let executor = SegmentExecutor::new(&output_dir, profile).with_progress_callback(Box::new(
        move |event| {
            if let SegmentEvent::Written { artifact, total } = event {
                if !json {
                    eprintln!("[{}/{}] {}", artifact.index, total, artifact.display_name);
                }
            }
        },
    ));

    let outcome = executor
        .split(&backend, input, secs)
        .with_context(|| format!("Failed to split {:?}", input))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.artifacts)?);
    } else {
        println!(
            "\nWrote {} segment(s) to {}",
            outcome.artifacts.len(),
            output_dir.display()
        );
        for artifact in &outcome.artifacts {
            println!(
                "  {}  {:>10.3}s - {:>10.3}s  {}",
                artifact.display_name,
                artifact.start,
                artifact.end,
                artifact.storage_path.display()
            );
        }
    }

    Ok(())
}

fn show_plan(
    total: f64,
    duration: Option<i64>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let secs = segment_secs(duration, &config)?;
    let plan = segment::plan(total, secs)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "{} segment(s) of {}s over {:.3}s",
        plan.len(),
        plan.segment_secs(),
        plan.total_duration()
    );
    for range in &plan {
        println!(
            "  [{}] {:.3}s - {:.3}s ({:.3}s)",
            range.index,
            range.start,
            range.end,
            range.duration()
        );
    }

    Ok(())
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let ffprobe = vidsplit_av::get_tool_path("ffprobe", config.tools.ffprobe_path.as_deref())?;
    let media_info = vidsplit_av::probe::probe_with_ffprobe(&ffprobe, file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&media_info)?);
        return Ok(());
    }

    println!("File: {}", media_info.file_path.display());
    println!("Container: {}", media_info.container);
    println!("Size: {} bytes", media_info.file_size);
    match media_info.duration {
        Some(duration) => {
            let secs = duration.as_secs();
            let mins = secs / 60;
            let hours = mins / 60;
            println!(
                "Duration: {:02}:{:02}:{:02} ({:.3}s)",
                hours,
                mins % 60,
                secs % 60,
                duration.as_secs_f64()
            );
        }
        None => println!("Duration: unknown"),
    }
    match media_info.video {
        Some(ref video) => match (video.width, video.height) {
            (Some(w), Some(h)) => println!("Video: {} {}x{}", video.codec, w, h),
            _ => println!("Video: {}", video.codec),
        },
        None => println!("Video: none"),
    }
    match media_info.audio {
        Some(ref audio) => println!("Audio: {}", audio.codec),
        None => println!("Audio: none"),
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = vidsplit_av::check_tools(
        config.tools.ffmpeg_path.as_deref(),
        config.tools.ffprobe_path.as_deref(),
    );

    let mut all_ok = true;
    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to split videos.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Upload dir: {}", config.storage.upload_dir.display());
            println!("  Segments dir: {}", config.storage.segments_dir.display());
            println!(
                "  Allowed extensions: {}",
                config.storage.allowed_extensions.join(", ")
            );
            println!("  Max upload: {} MB", config.storage.max_upload_mb);
            println!(
                "  Segments: {}s, {}/{} in {}",
                config.segmenting.default_segment_secs,
                config.segmenting.video_codec,
                config.segmenting.audio_codec,
                config.segmenting.container
            );
            println!("  Concurrent jobs: {}", config.jobs.max_concurrent);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Segments: {}s",
                config.segmenting.default_segment_secs
            );
        }
    }

    Ok(())
}

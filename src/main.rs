use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing::{error, info, warn};

use video_relay::caption::CaptionResolver;
use video_relay::config::Config;
use video_relay::llm::ChatClient;
use video_relay::media::HttpMediaFetcher;
use video_relay::pipeline::{Pipeline, RunOutcome};
use video_relay::publish::HttpPublisher;
use video_relay::rewrite::CaptionRewriter;
use video_relay::source::HttpMessageSource;
use video_relay::state::StateStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("video_relay=info,warn")
        .init();

    let matches = Command::new("Video Relay")
        .version("0.1.0")
        .about("Reposts channel videos to a microblog, one per run")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a TOML configuration file")
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .value_name("NAME")
                .help("Channel to scan (overrides config)")
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .value_name("DIR")
                .help("State directory (overrides config)")
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.apply_env();
            config
        }
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    if let Some(channel) = matches.get_one::<String>("channel") {
        config.source.channel = channel.clone();
    }
    if let Some(dir) = matches.get_one::<String>("state-dir") {
        config.state.state_dir = PathBuf::from(dir);
    }

    config.validate()?;

    info!("🚀 Video relay starting...");
    info!("📡 Channel: {}", config.source.channel);
    info!("📁 State directory: {}", config.state.state_dir.display());

    // Core state must be usable; anything less aborts the run.
    let mut state = StateStore::open(config.state.state_dir.clone()).await?;

    let source = HttpMessageSource::new(&config.source)?;
    let resolver = CaptionResolver::new(
        Box::new(ChatClient::new(config.llm.clone())?),
        config.caption.sender_window_seconds,
    );
    let rewriter = if config.caption.enable_rewrite {
        Some(CaptionRewriter::new(Box::new(ChatClient::new(
            config.llm.clone(),
        )?)))
    } else {
        None
    };
    let fetcher = HttpMediaFetcher::new(&config.source, config.state.scratch_dir.clone())?;
    let publisher = HttpPublisher::new(&config.publish)?;

    let pipeline = Pipeline::new(
        config,
        Box::new(source),
        resolver,
        rewriter,
        Box::new(fetcher),
        Box::new(publisher),
    );

    let start_time = std::time::Instant::now();
    let result = pipeline.run_once(&mut state).await;
    pipeline.shutdown().await;
    let duration = start_time.elapsed();

    match result {
        Ok(RunOutcome::Published {
            fingerprint,
            post_id,
        }) => {
            info!(
                "🎉 Run finished in {:.2}s: published post {} ({})",
                duration.as_secs_f64(),
                post_id,
                fingerprint
            );
        }
        Ok(RunOutcome::Failed {
            fingerprint,
            reason,
        }) => {
            info!(
                "🏁 Run finished in {:.2}s: {} recorded as failed ({})",
                duration.as_secs_f64(),
                fingerprint,
                reason
            );
        }
        Ok(RunOutcome::Idle) => {
            info!(
                "🏁 Run finished in {:.2}s: nothing to do",
                duration.as_secs_f64()
            );
        }
        Err(e) => {
            error!("💥 Run aborted: {:#}", e);
            return Err(e);
        }
    }

    Ok(())
}

mod config;

use archivist_channels::{LocalChannel, TelegramChannel};
use archivist_core::{format_size, LocalFileSource, OwnerId};
use archivist_pipeline::{spawn_idle_reaper, Dispatcher, SessionPipeline};
use archivist_security::{AllowList, AuthorizeOutcome};
use archivist_session::InMemorySessionStore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::ArchivistConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Owner id used for offline packing.
const LOCAL_OWNER: OwnerId = OwnerId(0);

#[derive(Parser)]
#[command(name = "archivist", about = "Archivist — zip archiver bot")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "archivist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot
    Serve {
        /// Staging directory (overrides config)
        #[arg(long)]
        staging_dir: Option<PathBuf>,
    },
    /// Add a user to the allow-list
    Authorise {
        /// Telegram user id
        user_id: i64,
    },
    /// Archive local files into an output directory
    Pack {
        /// Files to archive
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Archive name, e.g. data.zip
        #[arg(short, long)]
        name: Option<String>,
        /// Encrypt entries with this password
        #[arg(short, long)]
        password: Option<String>,
        /// Split artifacts larger than this many bytes (overrides config)
        #[arg(long)]
        max_part_size: Option<u64>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = ArchivistConfig::load(&cli.config).await?;
    config.apply_env(|key| std::env::var(key).ok())?;

    match cli.command {
        Commands::Serve { staging_dir } => {
            if let Some(dir) = staging_dir {
                config.archive.staging_dir = dir;
            }
            serve(config).await?;
        }
        Commands::Authorise { user_id } => {
            let allow_list = AllowList::new(&config.authorized_file, config.owner()?);
            match allow_list.authorize(OwnerId(user_id)).await? {
                AuthorizeOutcome::Added => println!("Authorized user: {user_id}"),
                AuthorizeOutcome::AlreadyAuthorized => println!("User already authorized"),
            }
        }
        Commands::Pack {
            files,
            name,
            password,
            max_part_size,
            out,
        } => {
            if let Some(max) = max_part_size {
                config.archive.max_part_size = max;
            }
            pack(&config, files, name, password, out).await?;
        }
    }

    Ok(())
}

async fn serve(config: ArchivistConfig) -> anyhow::Result<()> {
    let owner = config.owner()?;
    let pipeline_config = config.pipeline_config()?;
    tokio::fs::create_dir_all(&pipeline_config.staging_root).await?;

    let mut channel = TelegramChannel::new(config.token()?, 256).with_api_base(&config.bot.api_base);
    let events = channel
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Telegram event receiver already taken"))?;
    let channel = Arc::new(channel);

    let store = Arc::new(InMemorySessionStore::new(pipeline_config.max_total_size));
    let pipeline = Arc::new(SessionPipeline::new(
        pipeline_config,
        store,
        channel.clone(),
        channel.clone(),
    ));
    pipeline.sweep_orphans().await?;

    let allow_list = Arc::new(AllowList::new(&config.authorized_file, owner));
    let reaper = spawn_idle_reaper(pipeline.clone(), config.reap_interval());
    let dispatcher = Arc::new(Dispatcher::new(pipeline.clone(), channel.clone(), allow_list));
    let dispatch = tokio::spawn(dispatcher.run(events));

    info!(
        owner = %owner,
        max_total = %format_size(pipeline.config().max_total_size),
        max_part = %format_size(pipeline.config().max_part_size),
        "Archivist bot started"
    );

    let result = tokio::select! {
        r = channel.poll_updates() => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };
    reaper.abort();
    dispatch.abort();
    result?;
    Ok(())
}

async fn pack(
    config: &ArchivistConfig,
    files: Vec<PathBuf>,
    name: Option<String>,
    password: Option<String>,
    out: PathBuf,
) -> anyhow::Result<()> {
    let channel = Arc::new(LocalChannel::new(out));
    let pipeline_config = config.pipeline_config()?;
    let store = Arc::new(InMemorySessionStore::new(pipeline_config.max_total_size));
    let pipeline = SessionPipeline::new(pipeline_config, store, channel.clone(), channel.clone());

    pipeline.open(LOCAL_OWNER, Utc::now()).await?;
    let packed = async {
        for path in &files {
            let size = tokio::fs::metadata(path).await?.len();
            let display_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow::anyhow!("Not a file: {}", path.display()))?;
            pipeline
                .add_file(LOCAL_OWNER, &display_name, size, &LocalFileSource::new(path))
                .await?;
        }
        if let Some(name) = &name {
            pipeline.set_name(LOCAL_OWNER, name).await?;
        }
        if password.is_some() {
            pipeline.set_password(LOCAL_OWNER, password.clone()).await?;
        }
        Ok::<_, anyhow::Error>(pipeline.build_and_deliver(LOCAL_OWNER).await?)
    }
    .await;

    match packed {
        Ok(artifact) => {
            info!(archive = %artifact.name, bytes = artifact.size, "Packed");
            for delivery in channel.delivered() {
                println!("{}", delivery.path.display());
            }
            Ok(())
        }
        Err(e) => {
            if let Err(cancel) = pipeline.cancel(LOCAL_OWNER).await {
                warn!(error = %cancel, "Failed to clean up staging");
            }
            Err(e)
        }
    }
}

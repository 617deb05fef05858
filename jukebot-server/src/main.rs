use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use jukebot_common::models::playback::Volume;
use jukebot_common::traits::repository_traits::MessageLogRepository;
use jukebot_core::audio::{SessionManager, YtDlp};
use jukebot_core::liveness::start_liveness_server;
use jukebot_core::platforms::discord::{
    DiscordEventHandler, DiscordPlatform, SongbirdBackend, TwilightStatusSink, spawn_notice_task,
};
use jukebot_core::repositories::SqliteMessageLogRepository;
use jukebot_core::services::{MusicCommandService, StatusReporter};
use jukebot_core::tasks::heartbeat::spawn_heartbeat_task;
use jukebot_core::{BotConfig, Database, DefaultHttpClient};

#[derive(Parser, Debug, Clone)]
#[command(name = "jukebot")]
#[command(author, version, about = "JukeBot - Discord music bot")]
struct Args {
    /// Discord bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: String,

    /// Prefix for chat commands.
    #[arg(long, env = "COMMAND_PREFIX", default_value = "!")]
    command_prefix: String,

    /// SQLite URL for the message log.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://jukebot.db?mode=rwc")]
    database_url: String,

    /// Store every guild chat message.
    #[arg(long, env = "LOG_MESSAGES", default_value_t = true, action = ArgAction::Set)]
    log_messages: bool,

    /// Channel that receives online/reconnect/disconnect notices.
    #[arg(long, env = "STATUS_CHANNEL_ID")]
    status_channel_id: Option<u64>,

    /// Port of the liveness endpoint.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Uptime monitor URL pinged on every heartbeat.
    #[arg(long, env = "HEARTBEAT_URL")]
    heartbeat_url: Option<String>,

    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 300)]
    heartbeat_interval_secs: u64,

    /// Upper bound on fetching one track's audio.
    #[arg(long, env = "ACQUIRE_TIMEOUT_SECS", default_value_t = 20)]
    acquire_timeout_secs: u64,

    /// Starting volume in [0, 1].
    #[arg(long, env = "DEFAULT_VOLUME", default_value_t = 0.5)]
    default_volume: f32,

    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    ytdlp_path: String,

    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg_path: String,
}

impl Args {
    fn into_config(self) -> BotConfig {
        BotConfig {
            discord_token: self.discord_token,
            command_prefix: self.command_prefix,
            database_url: self.database_url,
            log_messages: self.log_messages,
            status_channel_id: self.status_channel_id,
            port: self.port,
            heartbeat_url: self.heartbeat_url.filter(|u| !u.trim().is_empty()),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            default_volume: Volume::new(self.default_volume),
            ytdlp_path: self.ytdlp_path,
            ffmpeg_path: self.ffmpeg_path,
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_log::LogTracer::init()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jukebot=info"));
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = Args::parse().into_config();
    config.validate()?;
    info!(
        "JukeBot starting. prefix='{}', port={}, message_log={}",
        config.command_prefix, config.port, config.log_messages
    );

    if let Err(e) = run(config).await {
        error!("JukeBot error: {:?}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    let message_log: Option<Arc<dyn MessageLogRepository>> = if config.log_messages {
        let db = Database::new(&config.database_url).await?;
        db.migrate().await?;
        Some(Arc::new(SqliteMessageLogRepository::new(db.pool().clone())))
    } else {
        None
    };

    let mut platform = DiscordPlatform::connect(&config.discord_token).await?;

    let (event_tx, event_rx) = unbounded_channel();
    let (notice_tx, notice_rx) = unbounded_channel();

    let ytdlp = YtDlp::new(config.ytdlp_path.clone());
    let backend = Arc::new(SongbirdBackend::new(
        platform.songbird(),
        ytdlp.clone(),
        config.ffmpeg_path.clone(),
        event_tx,
    ));
    let manager = Arc::new(SessionManager::new(backend, config.session_config(), Some(notice_tx)));
    let pump = manager.clone().spawn_event_pump(event_rx);

    let commands = Arc::new(MusicCommandService::new(
        manager.clone(),
        Arc::new(ytdlp),
        config.command_prefix.clone(),
    ));
    let reporter = Arc::new(StatusReporter::new(
        config.status_channel_id,
        Arc::new(TwilightStatusSink::new(platform.http())),
    ));
    let handler = Arc::new(DiscordEventHandler::new(&platform, commands, reporter, message_log));
    platform.start(handler);

    let notices = spawn_notice_task(platform.http(), notice_rx);
    let liveness = start_liveness_server(config.port).await?;

    let heartbeat = match &config.heartbeat_url {
        Some(url) => {
            let client = Arc::new(DefaultHttpClient::with_timeout(Duration::from_secs(30))?);
            info!("Heartbeat every {}s to {}", config.heartbeat_interval.as_secs(), url);
            Some(spawn_heartbeat_task(client, url.clone(), config.heartbeat_interval))
        }
        None => {
            warn!("HEARTBEAT_URL not set; uptime heartbeat disabled.");
            None
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {:?}", e);
    }
    info!("Ctrl-C detected; shutting down...");

    if let Some(task) = heartbeat {
        task.abort();
    }
    manager.stop_all().await;
    platform.disconnect().await;
    let _ = liveness.send(());
    pump.abort();
    notices.abort();

    info!("JukeBot shut down cleanly.");
    Ok(())
}

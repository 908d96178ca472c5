//! Keeper command-line client.
//!
//! Opens one session against the configured ensemble, runs a single
//! read-only command against it and closes the session.

use clap::{Parser, Subcommand};
use keeper_session::{Keeper, KeeperState, WatchedEvent, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::KeeperConfig;
use logging::KeeperLogFormatter;

/// Coordination service client
#[derive(Parser, Debug)]
#[command(name = "keeper", version, about = "Coordination service session client")]
struct Args {
    /// Comma separated ensemble, e.g. zk1:2181,zk2:2181
    #[arg(long)]
    servers: Option<String>,

    /// Requested session timeout, e.g. 4s
    #[arg(long)]
    timeout: Option<humantime::Duration>,

    /// Maximum random delay before each connection attempt
    #[arg(long)]
    connect_delay: Option<humantime::Duration>,

    /// Handshake deadline
    #[arg(long)]
    connect_timeout: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "keeper.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print node metadata
    Stat { path: String },
    /// Print node contents
    Get { path: String },
    /// List child nodes
    Ls { path: String },
    /// Wait for changes on a node
    Watch {
        path: String,
        /// Number of events to wait for
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

impl Args {
    fn apply(&self, config: &mut KeeperConfig) {
        if let Some(servers) = &self.servers {
            config.servers = servers.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout.into();
        }
        if let Some(delay) = self.connect_delay {
            config.connect_delay = delay.into();
        }
        if let Some(connect_timeout) = self.connect_timeout {
            config.connect_timeout = Some(connect_timeout.into());
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("keeper={}", args.log_level).parse()?)
        .add_directive(format!("keeper_session={}", args.log_level).parse()?)
        .add_directive(format!("keeper_wire={}", args.log_level).parse()?);

    let formatter = KeeperLogFormatter::new("keeper".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(formatter)
        .init();

    info!("Starting keeper client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = KeeperConfig::load_from_file(&args.config)?;
    args.apply(&mut config);

    let default_watcher = Watcher::callback(|event: &WatchedEvent| match event.state {
        KeeperState::Connected => component_info!("session", "Connected"),
        KeeperState::Disconnected => component_warn!("session", "Disconnected, reconnecting"),
        KeeperState::Expired => component_warn!("session", "Session expired"),
        KeeperState::AuthFailed => component_warn!("session", "Authentication failed"),
    });

    let keeper = Keeper::connect(config.addresses()?, config.session_config(), Some(default_watcher))?;

    let outcome = run(&keeper, args.command).await;

    match keeper.close() {
        Ok(pending) => {
            if let Err(e) = pending.await {
                warn!("Close did not complete cleanly: {}", e);
            }
        }
        Err(e) => warn!("Failed to close session: {}", e),
    }

    outcome
}

async fn run(keeper: &Keeper, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Stat { path } => match keeper.exists(&path, false)?.await? {
            Some(stat) => println!("{}", serde_json::to_string_pretty(&stat)?),
            None => println!("{path}: no such node"),
        },
        Command::Get { path } => {
            let node = keeper.get_data(&path, false)?.await?;
            println!("{}", String::from_utf8_lossy(&node.data));
        }
        Command::Ls { path } => {
            for child in keeper.get_children(&path, false)?.await? {
                println!("{child}");
            }
        }
        Command::Watch { path, count } => watch(keeper, &path, count).await?,
    }
    Ok(())
}

/// Re-arm an exists watch on `path` until `count` node events arrive
async fn watch(keeper: &Keeper, path: &str, count: usize) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = Watcher::callback(move |event: &WatchedEvent| {
        let _ = tx.send(event.clone());
    });

    for _ in 0..count {
        keeper.exists(path, watcher.clone())?.await?;
        let Some(event) = rx.recv().await else {
            break;
        };
        component_info!("watch", "{:?} {}", event.event_type, event.path);
        println!("{:?} {}", event.event_type, event.path);
    }
    Ok(())
}

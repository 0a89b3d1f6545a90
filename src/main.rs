use std::{env, path::PathBuf, sync::Arc, thread};

use colored::Colorize;
use jukebox_collab::{
    BroadcastRegistry, Collab, CollabEvent, LocalCache, MemoryStore, PgStore, SharedStore,
    StoreError,
};
use jukebox_core::Config;
use log::{error, info};
use thiserror::Error;
use tokio::runtime::{self, Runtime};

mod logging;

pub struct Jukebox {
    collab: Arc<Collab>,
    port: u16,
    runtime: Runtime,
}

#[derive(Debug, Error)]
enum JukeboxError {
    #[error("Could not initialize the room store: {0}")]
    Store(#[from] StoreError),

    #[error("Could not prepare the data directory: {0}")]
    DataDir(#[from] std::io::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Jukebox {
    fn new() -> Result<Self, JukeboxError> {
        info!("Building async runtime...");
        let main_runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("jukebox-async")
            .build()
            .map_err(|e| JukeboxError::Fatal(e.to_string()))?;

        let port = parse_env("JUKEBOX_SERVER_PORT")?.unwrap_or(jukebox_server::DEFAULT_PORT);

        let mut config = Config::default();
        if let Some(minutes) = parse_env("JUKEBOX_RETENTION_MINUTES")? {
            config.retention_in_minutes = minutes;
        }

        let data_dir = data_dir()?;
        info!("Using data directory {}", data_dir.display());

        let cache = LocalCache::new(data_dir.join("cache"))?;
        let registry = BroadcastRegistry::with_markers(data_dir.join("markers"), &config)?;

        let store: SharedStore = match env::var("JUKEBOX_DATABASE_URL") {
            Ok(url) => {
                info!("Connecting to database...");
                Arc::new(main_runtime.block_on(PgStore::new(&url))?)
            }
            Err(_) => {
                info!("No database configured, rooms are kept in memory");
                Arc::new(MemoryStore::new(config.broadcast_capacity))
            }
        };

        let collab = Collab::new(store, cache, registry, config);

        Ok(Self {
            collab: collab.into(),
            port,
            runtime: main_runtime,
        })
    }

    fn run(&self) -> Result<(), JukeboxError> {
        let events = self.collab.events();
        thread::spawn(move || {
            for event in events {
                log_event(&event);
            }
        });

        self.runtime.block_on(async move {
            // Keep the sweeper alive for as long as the server runs
            let _sweeper = self.collab.rooms.spawn_sweeper();

            jukebox_server::run_server(self.collab.clone(), self.port)
                .await
                .map_err(|e| JukeboxError::Fatal(e.to_string()))
        })
    }
}

impl JukeboxError {
    fn hint(&self) -> String {
        match self {
            JukeboxError::Store(_) => "This is a database error. Make sure the postgres instance at JUKEBOX_DATABASE_URL is running and reachable, or unset it to keep rooms in memory.".to_string(),
            JukeboxError::DataDir(_) => "Make sure JUKEBOX_DATA_DIR points to a writable directory.".to_string(),
            JukeboxError::InvalidEnv { .. } => "Check the environment variables and try again.".to_string(),
            JukeboxError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, JukeboxError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| JukeboxError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

fn data_dir() -> Result<PathBuf, JukeboxError> {
    if let Ok(dir) = env::var("JUKEBOX_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }

    LocalCache::default_dir().ok_or_else(|| JukeboxError::InvalidEnv {
        name: "JUKEBOX_DATA_DIR",
        value: "<unset, and no platform cache directory>".to_string(),
    })
}

fn log_event(event: &CollabEvent) {
    let target = "jukebox_collab::events";

    match event {
        CollabEvent::RoomCreated { room_id, creator } => {
            info!(target: target, "Room {} was created by {}", room_id, creator)
        }
        CollabEvent::RoomRestored { room_id, member_id } => {
            info!(target: target, "Room {} was restored from an invite by {}", room_id, member_id)
        }
        CollabEvent::RoomDeleted { room_id } => {
            info!(target: target, "Room {} was deleted", room_id)
        }
        CollabEvent::MemberJoined {
            room_id,
            member_id,
            display_name,
        } => info!(
            target: target,
            "{} ({}) joined room {}", display_name, member_id, room_id
        ),
        CollabEvent::MemberLeft { room_id, member_id } => {
            info!(target: target, "{} left room {}", member_id, room_id)
        }
        CollabEvent::Subscribed { room_id, kind } => {
            info!(target: target, "Subscribed to room {} over {}", room_id, kind)
        }
        // Too frequent to be useful at info
        CollabEvent::RoomUpdated { .. } => {}
    }
}

fn main() {
    logging::init_logger();

    let result = Jukebox::new().and_then(|jukebox| {
        info!("Initialized successfully.");
        jukebox.run()
    });

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "Jukebox failed to start!".bold().red());
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint()).dimmed().italic()
        );
    }
}

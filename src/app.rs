//! Application context shared by CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cli::Cli;
use crate::config::Config;
use crate::engine::{EngineSettings, JsonlEventLog, ProgressionEngine, TracingNotifier};
use crate::error::Result;
use crate::storage::Database;

pub struct AppContext {
    pub root: PathBuf,
    pub config: Config,
    /// File `gl config <key> <value>` writes to
    pub config_path: PathBuf,
    pub robot_mode: bool,
    pub engine: ProgressionEngine<Database>,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = cli.data_root();
        let config = Config::load(cli.config.as_deref(), &root)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| root.join("config.toml"));
        let robot_mode = cli.robot || config.output.robot;

        let db = Database::open_with_timeout(
            config.db_path(&root),
            config.storage.busy_timeout(),
        )?;
        let mut engine = ProgressionEngine::new(db, EngineSettings::from_config(&config))
            .with_notifier(Arc::new(TracingNotifier));
        if config.events.log_enabled {
            engine = engine.with_notifier(Arc::new(JsonlEventLog::new(
                config.event_log_path(&root),
            )));
        }
        debug!("Using data root {}", root.display());

        Ok(Self {
            root,
            config,
            config_path,
            robot_mode,
            engine,
        })
    }
}

//! gl init - Create the data directory, database and a starter config

use std::fs;
use std::path::Path;

use clap::Args;
use console::style;

use crate::cli::{output, Cli};
use crate::config::Config;
use crate::error::{LadderError, Result};
use crate::storage::Database;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.toml with defaults
    #[arg(long, short)]
    pub force: bool,
}

pub fn run(cli: &Cli, args: &InitArgs) -> Result<()> {
    initialize(&cli.data_root(), cli.config.as_deref(), cli.robot, args)
}

fn initialize(root: &Path, explicit: Option<&Path>, robot: bool, args: &InitArgs) -> Result<()> {
    fs::create_dir_all(root)?;

    let config_path = root.join("config.toml");
    let wrote_config = if !config_path.exists() || args.force {
        let rendered = toml::to_string_pretty(&Config::default())
            .map_err(|err| LadderError::Config(format!("render config: {err}")))?;
        fs::write(&config_path, rendered)?;
        true
    } else {
        false
    };

    let config = Config::load(explicit, root)?;
    let db_path = config.db_path(root);
    let db = Database::open_with_timeout(&db_path, config.storage.busy_timeout())?;

    if robot {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "root": root.display().to_string(),
            "db": db_path.display().to_string(),
            "schema_version": db.schema_version(),
            "config": config_path.display().to_string(),
            "config_written": wrote_config,
        })));
    }

    println!("{} Initialized at {}", style("✓").green().bold(), root.display());
    println!("  database  {} (schema v{})", db_path.display(), db.schema_version());
    if wrote_config {
        println!("  config    {}", config_path.display());
    } else {
        println!("  config    {} (kept, use --force to reset)", config_path.display());
    }
    println!();
    println!("Seed a ladder with:");
    println!("  gl ladder seed <guild> <skill>");
    Ok(())
}

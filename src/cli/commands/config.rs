//! gl config - Manage configuration

use std::path::Path;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output;
use crate::config::Config;
use crate::error::{LadderError, Result};

/// Keys accepted by `gl config <key> <value>`.
const KNOWN_KEYS: &[&str] = &[
    "storage.db_file",
    "storage.busy_timeout_ms",
    "verification.feedback_delimiter",
    "verification.defer_escalation_threshold",
    "verification.expire_after",
    "credits.allow_corrections",
    "credits.history_limit",
    "events.log_enabled",
    "events.log_file",
    "output.robot",
];

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Configuration key to get/set (e.g. verification.expire_after)
    pub key: Option<String>,

    /// Value to set
    pub value: Option<String>,

    /// List all configuration
    #[arg(long)]
    pub list: bool,

    /// Unset a configuration key
    #[arg(long)]
    pub unset: bool,
}

pub fn run(ctx: &AppContext, args: &ConfigArgs) -> Result<()> {
    let Some(key) = args.key.as_deref().filter(|_| !args.list) else {
        return emit_config(ctx);
    };

    if args.unset && args.value.is_some() {
        return Err(LadderError::Config(
            "cannot use --unset with a value".to_string(),
        ));
    }
    if !KNOWN_KEYS.contains(&key) {
        return Err(LadderError::Config(format!(
            "unknown key: {key} (known: {})",
            KNOWN_KEYS.join(", ")
        )));
    }

    if args.unset {
        return update_file(ctx, key, |doc| unset_path(doc, key));
    }

    if let Some(value) = args.value.as_deref() {
        let value = parse_value(value)?;
        return update_file(ctx, key, |doc| set_path(doc, key, value));
    }

    get_key(ctx, key)
}

fn emit_config(ctx: &AppContext) -> Result<()> {
    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(&ctx.config));
    }

    let rendered = toml::to_string_pretty(&ctx.config)
        .map_err(|err| LadderError::Config(format!("render config: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn get_key(ctx: &AppContext, key: &str) -> Result<()> {
    let doc = toml::Value::try_from(&ctx.config)
        .map_err(|err| LadderError::Config(format!("serialize config: {err}")))?;
    let value = get_path(&doc, key);
    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "key": key,
            "value": value,
        })));
    }
    match value {
        Some(value) => println!("{}", format_value(&value)),
        None => println!("(unset)"),
    }
    Ok(())
}

fn update_file(
    ctx: &AppContext,
    key: &str,
    edit: impl FnOnce(&mut toml::Value) -> Result<()>,
) -> Result<()> {
    let original = load_config_doc(&ctx.config_path)?;
    let mut doc = original.clone();
    edit(&mut doc)?;
    write_config_doc(&ctx.config_path, &doc)?;

    // Roll back edits the loader would refuse on the next run.
    if let Err(err) = Config::load(Some(&ctx.config_path), &ctx.root) {
        write_config_doc(&ctx.config_path, &original)?;
        return Err(LadderError::Config(format!("rejected value for {key}: {err}")));
    }

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "key": key,
            "path": ctx.config_path.display().to_string(),
        })));
    }
    println!("Updated {key} in {}", ctx.config_path.display());
    Ok(())
}

fn load_config_doc(path: &Path) -> Result<toml::Value> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| LadderError::Config(format!("read config: {err}")))?;
        let doc = toml::from_str(&raw)
            .map_err(|err| LadderError::Config(format!("parse config: {err}")))?;
        Ok(doc)
    } else {
        Ok(toml::Value::Table(toml::map::Map::new()))
    }
}

fn write_config_doc(path: &Path, doc: &toml::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| LadderError::Config(format!("create config dir: {err}")))?;
    }
    let rendered = toml::to_string_pretty(doc)
        .map_err(|err| LadderError::Config(format!("render config: {err}")))?;
    std::fs::write(path, rendered)
        .map_err(|err| LadderError::Config(format!("write config: {err}")))?;
    Ok(())
}

fn parse_value(raw: &str) -> Result<toml::Value> {
    let direct = format!("value = {raw}");
    if let Some(parsed) = toml::from_str::<toml::Value>(&direct)
        .ok()
        .and_then(|value| value.get("value").cloned())
    {
        return Ok(parsed);
    }
    Ok(toml::Value::String(raw.to_string()))
}

fn get_path(doc: &toml::Value, key: &str) -> Option<toml::Value> {
    let mut current = doc;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

fn set_path(doc: &mut toml::Value, key: &str, value: toml::Value) -> Result<()> {
    let (sections, leaf) = split_key(key)?;
    let mut current = doc;
    for part in sections {
        current = current
            .as_table_mut()
            .ok_or_else(|| LadderError::Config("config path is not a table".to_string()))?
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    current
        .as_table_mut()
        .ok_or_else(|| LadderError::Config("config path is not a table".to_string()))?
        .insert(leaf.to_string(), value);
    Ok(())
}

fn unset_path(doc: &mut toml::Value, key: &str) -> Result<()> {
    let (sections, leaf) = split_key(key)?;
    let mut current = doc;
    for part in sections {
        match current.get_mut(part) {
            Some(next) => current = next,
            None => return Ok(()),
        }
    }
    if let Some(table) = current.as_table_mut() {
        table.remove(leaf);
    }
    Ok(())
}

fn split_key(key: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts: Vec<&str> = key.split('.').collect();
    let leaf = parts
        .pop()
        .filter(|leaf| !leaf.is_empty())
        .ok_or_else(|| LadderError::Config("empty key".to_string()))?;
    Ok((parts, leaf))
}

fn format_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

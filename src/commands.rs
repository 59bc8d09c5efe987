//! CLI command implementations other than `serve` and `stats`.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::{load_config, Config};
use crate::server::AppState;

/// Starter configuration written by `askdoc init`.
pub const EXAMPLE_CONFIG: &str = include_str!("../config/askdoc.example.toml");

/// Write [`EXAMPLE_CONFIG`] to `config_path` unless it exists, then create
/// the storage directories it names.
pub fn run_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(config_path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }

    let cfg = load_config(config_path)?;
    for dir in [
        cfg.storage.knowledge_base.parent(),
        cfg.storage.upload_log.parent(),
        Some(cfg.storage.upload_dir.as_path()),
    ]
    .into_iter()
    .flatten()
    .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    println!("Data directory ready: {}", cfg.storage.upload_dir.display());
    Ok(())
}

pub async fn run_ingest(cfg: &Config, file: &Path) -> Result<()> {
    let filename = match file.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => bail!("Not a file path: {}", file.display()),
    };
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let state = AppState::open(cfg).await?;
    let report = state.ingestor().ingest(&filename, bytes).await?;

    println!("ingest {}", report.filename);
    println!("  pages processed: {}", report.pages_processed);
    println!("  chunks added:    {}", report.chunks_added);
    println!("ok");
    Ok(())
}

pub async fn run_delete(cfg: &Config, filename: &str) -> Result<()> {
    let state = AppState::open(cfg).await?;
    let report = state.ingestor().delete(filename).await?;

    println!("delete {}", report.filename);
    println!("  chunks removed: {}", report.chunks_removed);
    println!(
        "  stored file:    {}",
        if report.file_removed { "removed" } else { "not found" }
    );
    println!("ok");
    Ok(())
}

pub async fn run_ask(cfg: &Config, query: &str, explain: bool) -> Result<()> {
    let state = AppState::open(cfg).await?;
    let answer = state.answer(query).await?;

    println!("{}", answer.response);
    if explain {
        println!();
        println!("route: {:?}", answer.route);
    }
    Ok(())
}

//! CLI command implementations.

pub mod deploy;
pub mod order;

use anyhow::{Context, Result};
use monaco_config::{Config, Template};
use serde::Deserialize;
use std::path::Path;

/// Configs of all environments, as handed over by the loader.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub configs: Vec<Config>,
}

/// Read a manifest and keep the configs of the selected environments (all if none are given).
pub fn load_manifest(path: &Path, environments: &[String]) -> Result<Vec<Config>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let base = path.parent().unwrap_or(Path::new("."));
    let configs = parse_manifest(&content, base, environments)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
    if configs.is_empty() {
        anyhow::bail!("No configs to deploy in {}", path.display());
    }
    Ok(configs)
}

fn parse_manifest(content: &str, base: &Path, environments: &[String]) -> Result<Vec<Config>> {
    let manifest: Manifest = serde_json::from_str(content)?;
    let mut configs = manifest.configs;
    configs.retain(|c| environments.is_empty() || environments.contains(&c.environment));

    // Template files are relative to the manifest.
    for config in &mut configs {
        if let Template::File { path } = &mut config.template {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
    Ok(configs)
}

//! Print the deployment order without deploying anything.

use anyhow::Result;
use monaco_config::Config;
use monaco_scheduler::DependencyGraph;
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(manifest: &Path, environments: &[String], json: bool) -> Result<()> {
    let configs = super::load_manifest(manifest, environments)?;

    let mut by_environment: BTreeMap<&str, Vec<&Config>> = BTreeMap::new();
    for config in &configs {
        by_environment
            .entry(config.environment.as_str())
            .or_default()
            .push(config);
    }

    let mut failed = false;
    let mut report = serde_json::Map::new();
    for (environment, configs) in by_environment {
        let graph = DependencyGraph::build(environment, configs)?;
        let schedule = graph.schedule();
        failed |= !schedule.errors.is_empty();

        if json {
            report.insert(
                environment.to_string(),
                serde_json::json!({
                    "order": schedule.order.iter().map(|c| &c.coordinate).collect::<Vec<_>>(),
                    "errors": schedule.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                }),
            );
            continue;
        }

        println!("Environment {environment}");
        for (position, config) in schedule.order.iter().enumerate() {
            let skip = if config.skip { " (skip)" } else { "" };
            println!("  {:>3}. {}{skip}", position + 1, config.coordinate);
        }
        for err in &schedule.errors {
            println!("  ✗ {err}");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if failed {
        anyhow::bail!("Some configs cannot be scheduled");
    }
    Ok(())
}

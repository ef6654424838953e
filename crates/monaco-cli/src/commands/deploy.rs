//! Deploy a manifest against the in-memory clients.

use anyhow::{Context, Result};
use monaco_config::RunSettings;
use monaco_core::client::ClientSet;
use monaco_deployer::DryRunClient;
use monaco_scheduler::{ConfigState, RunController, RunResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub struct DeployOptions {
    pub environments: Vec<String>,
    pub continue_on_error: bool,
    pub sequential: bool,
    pub timeout: Option<u64>,
    pub json: bool,
}

pub async fn run(manifest: &Path, options: DeployOptions) -> Result<()> {
    let configs = super::load_manifest(manifest, &options.environments)?;

    let mut settings = RunSettings::from_process().with_parallel_environments(!options.sequential);
    if options.continue_on_error {
        settings = settings.continue_on_error();
    }
    let controller = RunController::new(settings);

    if let Some(seconds) = options.timeout {
        controller
            .cancellation()
            .cancel_after(Duration::from_secs(seconds));
    }
    let cancel = controller.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let clients: BTreeMap<String, ClientSet> = configs
        .iter()
        .map(|c| (c.environment.clone(), DryRunClient::new().client_set()))
        .collect();

    let results = controller.deploy_all(&configs, &clients).await;

    if options.json {
        let report: Vec<_> = results.iter().map(json_report).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode report")?
        );
    } else {
        for result in &results {
            print_summary(result);
        }
    }

    let errors: usize = results.iter().map(|r| r.errors.len()).sum();
    if errors > 0 {
        anyhow::bail!("Deployment finished with {errors} error(s)");
    }
    Ok(())
}

fn print_summary(result: &RunResult) {
    let elapsed = result.finished_at - result.started_at;
    println!(
        "\n--- Environment {} ({} ms) ---",
        result.environment,
        elapsed.num_milliseconds()
    );
    for (coordinate, state) in &result.states {
        let status = match state {
            ConfigState::Deployed => {
                let id = result
                    .entities
                    .get(coordinate)
                    .and_then(|e| e.id())
                    .unwrap_or_default();
                format!("✓ deployed ({id})")
            }
            ConfigState::Skipped => "⊘ skipped".to_string(),
            ConfigState::Failed => "✗ failed".to_string(),
            ConfigState::Pending => "○ not attempted".to_string(),
        };
        println!("  {coordinate} - {status}");
    }
    for warning in &result.warnings {
        println!("  ! {warning}");
    }
    for err in &result.errors {
        println!("  ✗ {err}");
    }
}

fn json_report(result: &RunResult) -> serde_json::Value {
    let states: BTreeMap<String, ConfigState> = result
        .states
        .iter()
        .map(|(coordinate, state)| (coordinate.to_string(), *state))
        .collect();
    let mut entities: Vec<_> = result.entities.iter().collect();
    entities.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));

    serde_json::json!({
        "environment": result.environment,
        "startedAt": result.started_at,
        "finishedAt": result.finished_at,
        "states": states,
        "entities": entities,
        "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "warnings": result.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}

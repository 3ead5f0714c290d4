//! CLI command implementations

use crate::output::format_output;
use crate::IdArgs;
use anyhow::Context;
use embedwatch_core::{
    build_address,
    sim::{MemoryHost, ScriptedApi},
    ApiGateway, DeferredHolder, EmbedConfig, EmbedController, FrameSnapshot, Identifiers,
    LoadRequest, PlayerEvent,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const CONTAINER: &str = "app";
const STATUS_TARGET: &str = "status";

/// Read configuration overrides, falling back to the defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EmbedConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EmbedConfig::from_json(&json)?
        }
        None => EmbedConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

impl IdArgs {
    fn identifiers(&self) -> Identifiers {
        Identifiers {
            primary_id: self.item.clone(),
            collection_id: self.collection.clone(),
            offset_seconds: self.offset,
            api_flag: self.api,
        }
    }
}

#[derive(Serialize)]
struct AddressReport {
    address: String,
}

/// Print the embed address for the given identifiers
pub fn address(ids: &IdArgs, config: &EmbedConfig, format: &str) -> anyhow::Result<()> {
    let report = AddressReport {
        address: build_address(&ids.identifiers(), config)?,
    };
    println!("{}", format_output(&report, format, |r| r.address.clone()));
    Ok(())
}

/// Parse one attempt script such as `ready:5,state:5,state:1`.
///
/// `ready:error` stands for a failed initial-state query.
pub fn parse_script(script: &str) -> anyhow::Result<Vec<PlayerEvent>> {
    script
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let (kind, value) = token
                .split_once(':')
                .with_context(|| format!("expected kind:code, got '{token}'"))?;
            match kind {
                "ready" if value == "error" => Ok(PlayerEvent::Ready(None)),
                "ready" => Ok(PlayerEvent::Ready(Some(parse_code(value)?))),
                "state" => Ok(PlayerEvent::StateChanged(parse_code(value)?)),
                other => anyhow::bail!("unknown event kind '{other}'"),
            }
        })
        .collect()
}

fn parse_code(value: &str) -> anyhow::Result<i32> {
    value
        .parse()
        .with_context(|| format!("invalid state code '{value}'"))
}

#[derive(Serialize)]
struct SimulationReport {
    outcome: &'static str,
    error: Option<String>,
    retries: u32,
    status: String,
    status_text: Option<String>,
    players_created: usize,
    frame: Option<FrameSnapshot>,
    removed_frames: Vec<String>,
}

/// Drive one controller session against the in-memory host
pub async fn simulate(
    ids: &IdArgs,
    attempts: &[String],
    late_api: bool,
    timeout_ms: u64,
    config: EmbedConfig,
    format: &str,
) -> anyhow::Result<()> {
    let host = Arc::new(MemoryHost::new());
    let api = Arc::new(if late_api {
        ScriptedApi::new()
    } else {
        ScriptedApi::loaded()
    });
    for attempt in attempts {
        api.push_script(parse_script(attempt)?);
    }

    let gateway = Arc::new(ApiGateway::new(
        api.clone(),
        host.clone(),
        config.api_script_url.clone(),
    ));
    let controller = EmbedController::new(config, gateway.clone())?;

    let request = LoadRequest::from(ids.identifiers());
    controller.load(request, CONTAINER, STATUS_TARGET).await?;

    if late_api {
        debug!(hooks = gateway.pending_hooks(), "Signalling player API ready");
        api.set_available(true);
        gateway.notify_api_ready();
    }

    let (outcome, error) =
        match tokio::time::timeout(Duration::from_millis(timeout_ms), controller.pending()).await {
            Ok(Ok(_)) => ("ready", None),
            Ok(Err(error)) => ("failed", Some(error.to_string())),
            Err(_) => ("pending", None),
        };

    let report = SimulationReport {
        outcome,
        error,
        retries: controller.retry_count().await,
        status: controller.status().await.to_string(),
        status_text: host.status_text(STATUS_TARGET),
        players_created: api.players().len(),
        frame: controller.frame().await.map(|frame| frame.snapshot()),
        removed_frames: host.removed(),
    };

    println!("{}", format_output(&report, format, render_simulation));
    Ok(())
}

fn render_simulation(report: &SimulationReport) -> String {
    let mut lines = vec![format!("Outcome: {}", report.outcome)];
    if let Some(error) = &report.error {
        lines.push(format!("  Error: {error}"));
    }
    lines.push(format!("  Retries: {}", report.retries));
    lines.push(format!("  Status: {}", report.status));
    if let Some(text) = &report.status_text {
        lines.push(format!("  Status text: {text}"));
    }
    lines.push(format!("  Players created: {}", report.players_created));
    match &report.frame {
        Some(frame) => {
            lines.push(format!("  Frame: {}", frame.id));
            lines.push(format!("  Source: {}", frame.src));
        }
        None => lines.push("  Frame: none".to_string()),
    }
    if !report.removed_frames.is_empty() {
        lines.push(format!("  Removed: {}", report.removed_frames.join(", ")));
    }
    lines.join("\n")
}

//! campaign-inapp — evaluate in-app campaign triggers against a catalog file.
//!
//! Stands in for the host application: loads fetched campaign definitions and
//! persisted state from disk, then fires triggers or acknowledgments.

use anyhow::Context;
use campaign_core::config::AppConfig;
use campaign_core::event_bus::tracing_sink;
use campaign_in_app::{
    definitions_from_document, CampaignCatalog, ContentRef, FsAssetOracle, JsonFileStorage,
    Orientation,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "campaign-inapp")]
#[command(about = "In-app campaign trigger evaluation")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, env = "CAMPAIGN_INAPP__CONFIG")]
    config: Option<String>,

    /// Campaign definitions JSON (overrides config)
    #[arg(long, env = "CAMPAIGN_INAPP__IN_APP__CATALOG_PATH")]
    catalog: Option<String>,

    /// Persisted state JSON (overrides config)
    #[arg(long, env = "CAMPAIGN_INAPP__IN_APP__STATE_PATH")]
    state: Option<String>,

    /// Directory downloaded assets live in (overrides config)
    #[arg(long, env = "CAMPAIGN_INAPP__IN_APP__STORAGE_ROOT")]
    storage_root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fire a trigger event and print what would be shown
    Trigger {
        event: String,

        #[arg(long, value_enum, default_value_t = CliOrientation::Any)]
        orientation: CliOrientation,

        /// Also acknowledge the display if something was selected
        #[arg(long, default_value_t = false)]
        show: bool,
    },

    /// Acknowledge that a campaign's content was presented
    Ack { campaign_id: i64 },

    /// Mark a campaign deleted
    Delete { campaign_id: i64 },

    /// Reset a campaign's state
    Reset { campaign_id: i64 },

    /// Print every campaign with its state and asset readiness
    Status,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliOrientation {
    Portrait,
    Landscape,
    Any,
}

impl From<CliOrientation> for Orientation {
    fn from(value: CliOrientation) -> Self {
        match value {
            CliOrientation::Portrait => Orientation::Portrait,
            CliOrientation::Landscape => Orientation::Landscape,
            CliOrientation::Any => Orientation::Any,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_inapp=info,campaign_in_app=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(path) = cli.catalog {
        config.in_app.catalog_path = path;
    }
    if let Some(path) = cli.state {
        config.in_app.state_path = path;
    }
    if let Some(root) = cli.storage_root {
        config.in_app.storage_root = root;
    }

    info!(
        catalog = %config.in_app.catalog_path,
        state = %config.in_app.state_path,
        storage_root = %config.in_app.storage_root,
        "Configuration loaded"
    );

    let default_delay = config.in_app.default_redisplay_delay()?;

    let raw = std::fs::read_to_string(&config.in_app.catalog_path)
        .with_context(|| format!("reading {}", config.in_app.catalog_path))?;
    let document: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", config.in_app.catalog_path))?;
    let definitions = definitions_from_document(document)?;

    let catalog = CampaignCatalog::new(
        Arc::new(JsonFileStorage::new(&config.in_app.state_path)),
        &config.in_app.storage_root,
    )
    .with_asset_oracle(Arc::new(FsAssetOracle))
    .with_diagnostics(tracing_sink())
    .with_default_redisplay_delay(default_delay);

    let report = catalog.load(&definitions);
    for rejected in &report.rejected {
        eprintln!(
            "Skipped definition #{} ({:?}): {}",
            rejected.index, rejected.campaign_id, rejected.error
        );
    }

    match cli.command {
        Commands::Trigger {
            event,
            orientation,
            show,
        } => {
            let outcome = catalog.on_trigger_for(&event, orientation.into());
            let selected = outcome.selection.as_ref().map(|selection| {
                let content = match selection.content() {
                    Some(ContentRef::Message(m)) => json!({ "type": "message", "id": m.id }),
                    Some(ContentRef::Conversation(c)) => {
                        json!({ "type": "conversation", "id": c.id, "pages": c.tree() })
                    }
                    None => serde_json::Value::Null,
                };
                json!({ "campaign_id": selection.campaign_id(), "content": content })
            });
            if show {
                if let Some(selection) = &outcome.selection {
                    catalog.acknowledge_display(selection.campaign_id());
                }
            }
            let output = json!({
                "trigger": event,
                "selection": selected,
                "diagnostics": outcome.diagnostics,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Ack { campaign_id } => {
            if catalog.snapshot().get(campaign_id).is_none() {
                anyhow::bail!("unknown campaign {campaign_id}");
            }
            catalog.acknowledge_display(campaign_id);
            println!("Acknowledged display for campaign {campaign_id}");
        }
        Commands::Delete { campaign_id } => {
            catalog.mark_deleted(campaign_id)?;
            println!("Campaign {campaign_id} deleted");
        }
        Commands::Reset { campaign_id } => {
            catalog.reset_campaign(campaign_id)?;
            println!("Campaign {campaign_id} reset");
        }
        Commands::Status => {
            let output = json!({
                "campaigns": catalog.summaries(),
                "missing_assets": catalog.missing_assets(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

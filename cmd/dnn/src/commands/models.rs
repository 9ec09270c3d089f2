//! Registered model listing.

use clap::Args;
use serde::Serialize;

use super::{load_config, output_result};
use crate::Cli;

/// List models registered in the config file.
#[derive(Args)]
pub struct ModelsCommand {}

#[derive(Serialize)]
struct ModelRow {
    id: String,
    format: String,
    model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    config: String,
    backend: String,
    target: String,
}

impl ModelsCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        // Registration only records sources, so the shim is not loaded here.
        let cfg = load_config(cli)?;
        giztoy_dnn::register_from_config(&cfg);

        let rows: Vec<ModelRow> = giztoy_dnn::list_models()
            .into_iter()
            .filter_map(|id| giztoy_dnn::model_info(&id))
            .map(|info| {
                let (format, model, config) = match info.source {
                    giztoy_dnn::ModelSource::Files { model, config, format } => (format, model, config),
                    giztoy_dnn::ModelSource::Memory { format, model, .. } => {
                        (format, format!("<{} bytes>", model.len()), String::new())
                    }
                };
                ModelRow {
                    id: info.id,
                    format: format.to_string(),
                    model,
                    config,
                    backend: info.backend.to_string(),
                    target: info.target.to_string(),
                }
            })
            .collect();

        if cli.json {
            return output_result(&rows, true);
        }
        if rows.is_empty() {
            eprintln!("no models registered");
            return Ok(());
        }
        println!("{:<20} {:<10} {:<10} {:<12} MODEL", "ID", "FORMAT", "BACKEND", "TARGET");
        for row in &rows {
            println!(
                "{:<20} {:<10} {:<10} {:<12} {}",
                row.id, row.format, row.backend, row.target, row.model
            );
        }
        Ok(())
    }
}

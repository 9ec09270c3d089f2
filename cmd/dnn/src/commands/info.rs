//! Model inspection command.

use clap::Args;
use giztoy_dnn::ModelFormat;
use serde::Serialize;

use super::{init_runtime, open_model, output_result};
use crate::Cli;

/// Show the layers of a model.
#[derive(Args)]
pub struct InfoCommand {
    /// Model file path or registered model ID
    model: String,

    /// Model config file (e.g. Caffe .prototxt)
    #[arg(long)]
    config: Option<String>,

    /// Model format (auto, caffe, tensorflow, onnx, torch, darknet)
    #[arg(long, default_value = "auto")]
    format: ModelFormat,
}

#[derive(Serialize)]
struct NetInfo {
    model: String,
    layer_count: usize,
    layers: Vec<String>,
    outputs: Vec<String>,
}

impl InfoCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        init_runtime(cli)?;
        let net = open_model(&self.model, self.config.as_deref(), self.format)?;

        let layers = net.layer_names()?;
        let info = NetInfo {
            model: self.model.clone(),
            layer_count: layers.len(),
            layers,
            outputs: net.unconnected_out_layer_names()?,
        };

        if cli.json {
            return output_result(&info, true);
        }
        println!("Model:   {}", info.model);
        println!("Layers:  {}", info.layer_count);
        for (i, name) in info.layers.iter().enumerate() {
            println!("  {i:4}  {name}");
        }
        println!("Outputs: {}", info.outputs.join(", "));
        Ok(())
    }
}

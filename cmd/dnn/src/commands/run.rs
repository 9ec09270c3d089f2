//! Single forward-pass command.

use std::time::Instant;

use clap::Args;
use giztoy_dnn::{
    Backend, ImreadFlags, Mat, ModelFormat, Scalar, Size, Target, blob_from_image, get_blob_channel, get_blob_size,
};
use serde::Serialize;

use super::{init_runtime, open_model, output_result, parse_mean, parse_size, top_k};
use crate::Cli;

/// Run one forward pass on an image.
#[derive(Args)]
pub struct RunCommand {
    /// Model file path or registered model ID
    model: String,

    /// Input image
    #[arg(long)]
    image: String,

    /// Model config file (e.g. Caffe .prototxt)
    #[arg(long)]
    config: Option<String>,

    /// Model format (auto, caffe, tensorflow, onnx, torch, darknet)
    #[arg(long, default_value = "auto")]
    format: ModelFormat,

    /// Network input size as WxH (0x0 keeps the image size)
    #[arg(long, default_value = "0x0", value_parser = parse_size)]
    size: Size,

    /// Multiplier applied after mean subtraction
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Per-channel mean, e.g. 104,117,123
    #[arg(long, default_value = "0", value_parser = parse_mean)]
    mean: Scalar,

    /// Swap the first and third channels
    #[arg(long)]
    swap_rb: bool,

    /// Center-crop after resizing
    #[arg(long)]
    crop: bool,

    /// Input layer name (empty for the default input)
    #[arg(long, default_value = "")]
    input: String,

    /// Output layer name (empty for the default output)
    #[arg(long, default_value = "")]
    output: String,

    /// Preferable backend (default, halide, openvino, opencv)
    #[arg(long)]
    backend: Option<Backend>,

    /// Preferable target (cpu, opencl, opencl_fp16, vpu)
    #[arg(long)]
    target: Option<Target>,

    /// Number of top values to print
    #[arg(long, default_value_t = 5)]
    top: usize,
}

#[derive(Serialize)]
struct TopValue {
    index: usize,
    value: f32,
}

#[derive(Serialize)]
struct RunReport {
    model: String,
    output: String,
    shape: Vec<usize>,
    elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    inference_ms: Option<f64>,
    top: Vec<TopValue>,
}

impl RunCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        init_runtime(cli)?;
        let mut net = open_model(&self.model, self.config.as_deref(), self.format)?;
        if let Some(backend) = self.backend {
            net.set_preferable_backend(backend)?;
        }
        if let Some(target) = self.target {
            net.set_preferable_target(target)?;
        }

        let img = Mat::imread(&self.image, ImreadFlags::Color)?;
        tracing::debug!(rows = img.rows(), cols = img.cols(), "image loaded");
        let blob = blob_from_image(&img, self.scale, self.size, self.mean, self.swap_rb, self.crop)?;
        net.set_input(&blob, &self.input)?;

        let start = Instant::now();
        let out = net.forward(&self.output)?;
        let elapsed = start.elapsed();
        let inference = net.perf_profile().ok();

        // 4-D blobs report their first plane; anything else is read flat.
        let (shape, values) = match get_blob_size(&out) {
            Ok(size) => {
                let plane = get_blob_channel(&out, 0, 0)?;
                (vec![size.n, size.c, size.h, size.w], plane.to_f32_vec()?)
            }
            Err(_) => (
                vec![out.rows().max(0) as usize, out.cols().max(0) as usize],
                out.to_f32_vec()?,
            ),
        };

        let report = RunReport {
            model: self.model.clone(),
            output: self.output.clone(),
            shape,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            inference_ms: inference.map(|d| d.as_secs_f64() * 1000.0),
            top: top_k(&values, self.top)
                .into_iter()
                .map(|(index, value)| TopValue { index, value })
                .collect(),
        };

        if cli.json {
            return output_result(&report, true);
        }
        println!("Output:    {:?}", report.shape);
        println!("Elapsed:   {:.2} ms", report.elapsed_ms);
        if let Some(ms) = report.inference_ms {
            println!("Inference: {ms:.2} ms");
        }
        println!("Top values:");
        for t in &report.top {
            println!("  [{:6}] {:.6}", t.index, t.value);
        }
        Ok(())
    }
}

use clap::Parser;
use faceboxes::io::image_shape;
use faceboxes::{
    Detection, ImageMeta, ImageShape, NetworkInfo, PostProcessor, PostprocessConfig, RawOutputs,
    TensorDesc, TensorView, Variance,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "FaceBoxes post-processing CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
struct TensorJson {
    name: String,
    shape: Vec<usize>,
}

impl From<&TensorJson> for TensorDesc {
    fn from(value: &TensorJson) -> Self {
        TensorDesc::new(value.name.as_str(), &value.shape)
    }
}

#[derive(Debug, Deserialize)]
struct NetworkJson {
    input: TensorJson,
    outputs: Vec<TensorJson>,
}

impl NetworkJson {
    fn info(&self) -> NetworkInfo {
        NetworkInfo {
            inputs: vec![TensorDesc::from(&self.input)],
            outputs: self.outputs.iter().map(TensorDesc::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SizeJson {
    height: usize,
    width: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PostprocessJson {
    confidence_threshold: f32,
    nms_threshold: f32,
    keep_top_k: usize,
    variance: [f32; 2],
    parallel: bool,
}

impl Default for PostprocessJson {
    fn default() -> Self {
        let cfg = PostprocessConfig::default();
        Self {
            confidence_threshold: cfg.confidence_threshold,
            nms_threshold: cfg.nms_threshold,
            keep_top_k: cfg.keep_top_k,
            variance: [cfg.variance.center, cfg.variance.size],
            parallel: cfg.parallel,
        }
    }
}

impl From<&PostprocessJson> for PostprocessConfig {
    fn from(value: &PostprocessJson) -> Self {
        Self {
            variance: Variance {
                center: value.variance[0],
                size: value.variance[1],
            },
            confidence_threshold: value.confidence_threshold,
            nms_threshold: value.nms_threshold,
            keep_top_k: value.keep_top_k,
            parallel: value.parallel,
            ..PostprocessConfig::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct Config {
    network: NetworkJson,
    /// Output tensor name to a raw little-endian f32 dump.
    tensors: HashMap<String, PathBuf>,
    #[serde(default)]
    image_path: Option<PathBuf>,
    #[serde(default)]
    original_size: Option<SizeJson>,
    #[serde(default)]
    output_path: Option<PathBuf>,
    #[serde(default)]
    postprocess: PostprocessJson,
}

#[derive(Debug, Serialize)]
struct DetectionRecord {
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
    score: f32,
    class_id: u32,
    label: Option<&'static str>,
}

impl From<Detection> for DetectionRecord {
    fn from(value: Detection) -> Self {
        Self {
            xmin: value.xmin,
            ymin: value.ymin,
            xmax: value.xmax,
            ymax: value.ymax,
            score: value.score,
            class_id: value.class_id,
            label: value.label(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    image_height: usize,
    image_width: usize,
    detections: Vec<DetectionRecord>,
}

fn read_f32_le(path: &Path) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(format!(
            "{}: length {} is not a multiple of 4",
            path.display(),
            bytes.len()
        )
        .into());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn original_shape(config: &Config) -> Result<ImageShape, Box<dyn std::error::Error>> {
    if let Some(size) = &config.original_size {
        return Ok(ImageShape::new(size.height, size.width));
    }
    match &config.image_path {
        Some(path) => Ok(image_shape(path)?),
        None => Err("either original_size or image_path must be set in the config".into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("faceboxes=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;

    let network = config.network.info();
    let processor = PostProcessor::new(&network, PostprocessConfig::from(&config.postprocess))?;
    let layout = processor.layout();
    let original = original_shape(&config)?;
    let meta = ImageMeta::new(
        original,
        ImageShape::new(layout.input_height(), layout.input_width()),
    );

    let mut buffers: Vec<(&str, &[usize], Vec<f32>)> = Vec::with_capacity(config.tensors.len());
    for desc in &config.network.outputs {
        let path = config
            .tensors
            .get(&desc.name)
            .ok_or_else(|| format!("no tensor file given for output `{}`", desc.name))?;
        buffers.push((desc.name.as_str(), desc.shape.as_slice(), read_f32_le(path)?));
    }
    let mut named = HashMap::with_capacity(buffers.len());
    for (name, shape, data) in &buffers {
        named.insert(*name, TensorView::new(data, shape)?);
    }

    let detections = processor.process(RawOutputs::Named(named), &meta)?;
    let output = Output {
        image_height: original.height,
        image_width: original.width,
        detections: detections.into_iter().map(DetectionRecord::from).collect(),
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

use anyhow::anyhow;
use burn::backend::NdArray;
use burn::config::Config;
use burn::prelude::Tensor;
use burn::tensor::Distribution;
use clap::Parser;
use sn_top::cache::DiskCacheConfig;
use sn_top::models::params::LearnableParams;
use sn_top::models::top::{TOP_MODEL_NAMES, TopModel, TopModelConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Build a top model and run one forward pass", long_about = None)]
pub struct Args {
    /// Model name.
    #[arg(
        long,
        default_value = "cnn",
        value_parser = clap::builder::PossibleValuesParser::new(TOP_MODEL_NAMES)
    )]
    model: String,

    /// Number of output classes.
    #[arg(long, default_value = "10")]
    num_classes: usize,

    /// Scattering coefficients per colour channel.
    #[arg(long, default_value = "81")]
    in_channels: usize,

    /// Load pretrained weights, where the model has them.
    #[arg(long)]
    pretrained: bool,

    /// JSON model config; overrides `--model`, `--num-classes` and `--in-channels`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Batch size of the random input.
    #[arg(long, default_value = "2")]
    batch_size: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    type B = NdArray<f32>;
    let device = Default::default();

    let config = match &args.config {
        Some(path) => TopModelConfig::load(path)
            .map_err(|err| anyhow!("failed to load {}: {err:?}", path.display()))?,
        None => TopModelConfig::by_name(&args.model, args.num_classes, args.in_channels)?,
    };

    let model: TopModel<B> = if args.pretrained {
        config.try_init(&device, &DiskCacheConfig::default())?
    } else {
        config.init(&device)
    };

    let input_shape = config.input_shape(args.batch_size);
    tracing::info!(?input_shape, "forward pass");

    let input: Tensor<B, 4> = Tensor::random(input_shape, Distribution::Normal(0.0, 1.0), &device);
    let output = model.forward(input);

    println!("model:        {}", config.name());
    println!("params:       {}", model.count_learnable_params());
    println!("input shape:  {input_shape:?}");
    println!("output shape: {:?}", output.dims());

    Ok(())
}

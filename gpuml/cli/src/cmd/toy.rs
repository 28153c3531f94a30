use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gpuml_model::{ArchitectureTag, ToyModelSpec};
use gpuml_quant::QuantScheme;

#[derive(Args)]
pub struct ToyArgs {
    /// Output path for the container.
    out: PathBuf,

    /// Model family (llama, mistral, qwen2, qwen3, phi3).
    #[arg(long, default_value = "llama", value_parser = super::parse_arch)]
    arch: ArchitectureTag,

    /// Weight scheme (f32, f16, q8_0).
    #[arg(long, default_value = "q8_0", value_parser = super::parse_scheme)]
    scheme: QuantScheme,

    #[arg(long, default_value_t = 64)]
    dim: usize,

    #[arg(long, default_value_t = 128)]
    hidden_dim: usize,

    #[arg(long, default_value_t = 2)]
    layers: usize,

    #[arg(long, default_value_t = 4)]
    heads: usize,

    #[arg(long, default_value_t = 2)]
    kv_heads: usize,

    #[arg(long, default_value_t = 48)]
    vocab: usize,

    #[arg(long, default_value_t = 32)]
    context: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Reuse the embedding table as the output projection.
    #[arg(long)]
    tied: bool,
}

pub fn run(args: ToyArgs) -> Result<()> {
    let mut spec = ToyModelSpec::new(args.arch, args.scheme);
    spec.dim = args.dim;
    spec.hidden_dim = args.hidden_dim;
    spec.n_layers = args.layers;
    spec.n_heads = args.heads;
    spec.n_kv_heads = args.kv_heads;
    spec.vocab_size = args.vocab;
    spec.context_length = args.context;
    spec.seed = args.seed;
    spec.tied_output = args.tied;

    spec.write(&args.out)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    println!(
        "Wrote {} {} model to {}",
        args.arch,
        args.scheme,
        args.out.display()
    );
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Args;
use gpuml_device::{DecodeSession, RuntimeConfig};
use gpuml_plan::{compile, DeviceVendor, GridPolicy};

#[derive(Args)]
pub struct DecodeArgs {
    /// Path to a GGUF model file.
    model: PathBuf,

    /// Token ids to feed, one per step.
    #[arg(long, value_delimiter = ',', required = true)]
    tokens: Vec<u32>,

    /// Vendor whose work-group sizes to use.
    #[arg(long, default_value = "generic", value_parser = super::parse_vendor)]
    vendor: DeviceVendor,

    /// Cap the context length.
    #[arg(long)]
    max_context: Option<usize>,

    /// Worker threads (0 = all cores).
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

fn argmax(logits: &[f32]) -> (usize, f32) {
    logits
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}

pub fn run(args: DecodeArgs) -> Result<()> {
    RuntimeConfig {
        num_threads: args.threads,
    }
    .apply()?;

    let model = super::open(&args.model, args.max_context)?;
    if args.tokens.len() > model.config.context_length {
        bail!(
            "{} tokens do not fit a context of {}",
            args.tokens.len(),
            model.config.context_length
        );
    }
    let state = model.new_state();
    let plan = compile(
        &model.descriptor,
        &model.config,
        &model.weights,
        &state,
        &GridPolicy::for_vendor(args.vendor),
    )
    .context("Failed to compile plan")?;
    let mut session = DecodeSession::new(&model, Arc::new(plan))?;
    log::info!(
        "Decoding {} tokens with {} on {}",
        args.tokens.len(),
        model.descriptor.tag,
        args.vendor.name()
    );

    let start = Instant::now();
    for (pos, &token) in args.tokens.iter().enumerate() {
        let logits = session
            .step(token, pos)
            .with_context(|| format!("Decode failed at position {}", pos))?;
        let (id, value) = argmax(logits);
        let text = model.vocabulary.token(id as u32).unwrap_or("?");
        log::debug!("Step {} done: token {} -> {}", pos, token, id);
        println!("{}\t{}\t{}\t{}\t{:.4}", pos, token, id, text, value);
    }
    let elapsed = start.elapsed().as_secs_f64();
    eprintln!(
        "{} steps in {:.3}s ({:.1} tok/s)",
        args.tokens.len(),
        elapsed,
        args.tokens.len() as f64 / elapsed.max(1e-9)
    );
    Ok(())
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct InfoArgs {
    /// Path to a GGUF model file.
    model: PathBuf,

    /// Cap the context length.
    #[arg(long)]
    max_context: Option<usize>,
}

pub fn run(args: InfoArgs) -> Result<()> {
    let model = super::open(&args.model, args.max_context)?;
    let d = &model.descriptor;
    let c = &model.config;
    let w = &model.weights;

    println!("Architecture:  {}", d.tag);
    println!(
        "Structure:     qkv={} ffn={} qk_norm={} qkv_bias={} rope={:?}",
        if d.fused_qkv { "fused" } else { "separate" },
        if d.fused_gate_up { "fused" } else { "separate" },
        d.qk_norm,
        d.qkv_bias,
        d.rope_style
    );
    println!("Weights:       {}", w.scheme);
    println!(
        "Output:        {} ({})",
        if w.is_tied() { "tied to embedding" } else { "output.weight" },
        w.output_projection().scheme()
    );
    println!("Dim:           {}", c.dim);
    println!("Hidden dim:    {}", c.hidden_dim);
    println!("Layers:        {}", c.n_layers);
    println!("Heads:         {} (kv {})", c.n_heads, c.n_kv_heads);
    println!("Head size:     {}", c.head_size);
    println!("Vocab:         {}", c.vocab_size);
    println!("Context:       {}", c.context_length);
    println!("Norm eps:      {:e}", c.norm_eps);
    println!("RoPE base:     {}", c.rope_theta);
    if let Some(s) = &c.rope_scaling {
        println!("RoPE scaling:  {:?} x{}", s.kind, s.factor);
    }
    let v = &model.vocabulary;
    println!(
        "Tokens:        {} (bos {:?}, eos {:?})",
        v.len(),
        v.bos_token_id,
        v.eos_token_id
    );
    Ok(())
}

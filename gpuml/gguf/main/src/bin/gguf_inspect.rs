use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gpuml_gguf::{GGUFValue, TensorContainer};

/// gpuml GGUF Inspector: inspect tensor container files.
#[derive(Parser)]
#[command(name = "gpuml-gguf-inspect", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show container summary: version, alignment, architecture, tensor bytes per type.
    Info {
        /// Path to the GGUF model file.
        path: PathBuf,
    },

    /// Dump metadata key-value pairs.
    Meta {
        /// Path to the GGUF model file.
        path: PathBuf,

        /// Filter to a specific metadata key.
        #[arg(long)]
        key: Option<String>,
    },

    /// List tensor descriptors: name, type, shape, offset, byte length.
    Tensors {
        /// Path to the GGUF model file.
        path: PathBuf,

        /// Filter tensors whose name contains this pattern.
        #[arg(long)]
        filter: Option<String>,
    },
}

/// Scalars inline, strings truncated at 200 chars, arrays as `[array, len=N]`.
fn format_value(val: &GGUFValue) -> String {
    match val {
        GGUFValue::U8(v) => format!("{v}"),
        GGUFValue::I8(v) => format!("{v}"),
        GGUFValue::U16(v) => format!("{v}"),
        GGUFValue::I16(v) => format!("{v}"),
        GGUFValue::U32(v) => format!("{v}"),
        GGUFValue::I32(v) => format!("{v}"),
        GGUFValue::U64(v) => format!("{v}"),
        GGUFValue::I64(v) => format!("{v}"),
        GGUFValue::F32(v) => format!("{v}"),
        GGUFValue::F64(v) => format!("{v}"),
        GGUFValue::Bool(v) => format!("{v}"),
        GGUFValue::String(v) => {
            if v.chars().count() > 200 {
                let head: String = v.chars().take(200).collect();
                format!("\"{}...\" (len={})", head, v.len())
            } else {
                format!("\"{v}\"")
            }
        }
        GGUFValue::Array(arr) => format!("[array, len={}]", arr.len()),
    }
}

fn open(path: &PathBuf) -> Result<TensorContainer> {
    TensorContainer::open(path).with_context(|| format!("Failed to open GGUF: {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Info { path } => {
            let container = open(path)?;
            let header = container.header();

            println!("GGUF version:  {}", header.version);
            println!("Tensor count:  {}", header.descriptors.len());
            println!("Alignment:     {}", header.alignment);
            println!("Data offset:   {}", header.data_offset);

            let md = container.metadata();
            match md.get_str("general.architecture") {
                Some(arch) => {
                    println!("Architecture:  {arch}");
                    for (label, suffix) in [
                        ("Dimensions:   ", "embedding_length"),
                        ("Layers:       ", "block_count"),
                        ("Heads:        ", "attention.head_count"),
                        ("KV heads:     ", "attention.head_count_kv"),
                        ("Context:      ", "context_length"),
                    ] {
                        if let Some(v) = md.get(&format!("{arch}.{suffix}")) {
                            println!("{label} {}", format_value(v));
                        }
                    }
                }
                None => println!("Architecture:  (not declared)"),
            }

            let mut by_type: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
            for d in container.descriptors() {
                let entry = by_type.entry(d.ggml_type.name()).or_default();
                entry.0 += 1;
                entry.1 += d.byte_len;
            }
            for (ty, (count, bytes)) in by_type {
                println!("  {ty:<6} {count:>5} tensor(s) {bytes:>14} bytes");
            }
        }

        Command::Meta { path, key } => {
            let container = open(path)?;
            let md = container.metadata();

            if let Some(filter_key) = key {
                match md.get(filter_key) {
                    Some(val) => println!("{filter_key} = {}", format_value(val)),
                    None => eprintln!("Key not found: {filter_key}"),
                }
            } else {
                for k in md.keys() {
                    if let Some(val) = md.get(k) {
                        println!("{k} = {}", format_value(val));
                    }
                }
            }
        }

        Command::Tensors { path, filter } => {
            let container = open(path)?;

            let mut count = 0usize;
            for d in container.descriptors().iter().filter(|d| {
                filter
                    .as_ref()
                    .map_or(true, |pat| d.name.contains(pat.as_str()))
            }) {
                println!(
                    "{:<48} {:<5} {:?}  offset={} bytes={}",
                    d.name,
                    d.ggml_type.name(),
                    d.shape(),
                    d.offset,
                    d.byte_len
                );
                count += 1;
            }
            eprintln!("{count} tensor(s) listed");
        }
    }

    Ok(())
}

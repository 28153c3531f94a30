pub mod decode;
pub mod info;
pub mod plan;
pub mod toy;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use gpuml_model::{load_model, ArchitectureTag, LoadOptions, Model};
use gpuml_plan::DeviceVendor;
use gpuml_quant::QuantScheme;

#[derive(Subcommand)]
pub enum Command {
    /// Show the architecture, configuration and weights of a model.
    Info(info::InfoArgs),

    /// Compile a model and print its task graphs and worker grids.
    Plan(plan::PlanArgs),

    /// Write a small seeded model container.
    Toy(toy::ToyArgs),

    /// Decode a token sequence and print the arg-max logit per step.
    Decode(decode::DecodeArgs),
}

pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Info(args) => info::run(args),
        Command::Plan(args) => plan::run(args),
        Command::Toy(args) => toy::run(args),
        Command::Decode(args) => decode::run(args),
    }
}

pub(crate) fn open(path: &Path, max_context: Option<usize>) -> Result<Model> {
    load_model(path, &LoadOptions { max_context })
        .with_context(|| format!("Failed to load model: {}", path.display()))
}

pub(crate) fn parse_arch(s: &str) -> Result<ArchitectureTag, String> {
    ArchitectureTag::ALL
        .into_iter()
        .find(|t| t.name().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown architecture '{}'", s))
}

pub(crate) fn parse_scheme(s: &str) -> Result<QuantScheme, String> {
    QuantScheme::ALL
        .into_iter()
        .find(|q| q.name().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown scheme '{}' (expected f32, f16 or q8_0)", s))
}

pub(crate) fn parse_vendor(s: &str) -> Result<DeviceVendor, String> {
    DeviceVendor::from_name(s).ok_or_else(|| format!("unknown vendor '{}'", s))
}

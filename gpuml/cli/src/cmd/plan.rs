use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gpuml_plan::{compile, BufferId, DeviceVendor, GridPolicy};

#[derive(Args)]
pub struct PlanArgs {
    /// Path to a GGUF model file.
    model: PathBuf,

    /// Vendor whose work-group sizes to use (nvidia, amd, intel, apple, generic).
    #[arg(long, default_value = "generic", value_parser = super::parse_vendor)]
    vendor: DeviceVendor,

    /// Cap the context length.
    #[arg(long)]
    max_context: Option<usize>,

    /// List every transferred buffer instead of counts.
    #[arg(long)]
    transfers: bool,
}

fn list(ids: &[BufferId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

pub fn run(args: PlanArgs) -> Result<()> {
    let model = super::open(&args.model, args.max_context)?;
    let state = model.new_state();
    let policy = GridPolicy::for_vendor(args.vendor);
    let plan = compile(
        &model.descriptor,
        &model.config,
        &model.weights,
        &state,
        &policy,
    )
    .with_context(|| format!("Failed to compile plan for {}", args.model.display()))?;

    println!(
        "Plan: {}/{} for {}, {} graphs, {} kernels",
        plan.arch(),
        plan.scheme(),
        args.vendor.name(),
        plan.graphs().len(),
        plan.kernel_count()
    );
    for graph in plan.graphs() {
        println!();
        println!("{}", graph.name());
        if let Some(dep) = graph.dependency() {
            println!("  consumes:     {}", dep);
        }
        if args.transfers {
            println!("  upload once:  {}", list(graph.upload_once()));
            println!("  upload every: {}", list(graph.upload_every()));
        } else {
            println!(
                "  uploads:      {} once, {} every step",
                graph.upload_once().len(),
                graph.upload_every().len()
            );
        }
        for task in graph.tasks() {
            let grid = plan
                .schedule()
                .get(graph.name(), &task.name)
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<20} {:<14} {}", task.name, task.op.label(), grid);
        }
        if !graph.download().is_empty() {
            println!("  download:     {}", list(graph.download()));
        }
    }
    Ok(())
}

//! Print what gridview sees in a dataset: engine, dimensions, variables,
//! attributes and coordinate ranges.
//!
//! Usage: `inspect_dataset <path-or-url> [--engines zarr,netcdf]`

use anyhow::{bail, Context};
use clap::Parser;

use gridview::coords::format_number;
use gridview::{open_dataset, Dataset, EngineKind};

#[derive(Parser, Debug)]
#[command(name = "inspect_dataset", about = "Inspect a Zarr store or NetCDF file")]
struct Args {
    /// Local path or http(s) URL of the dataset
    dataset: String,

    /// Storage engines to try, in order
    #[arg(long, default_value = "zarr,netcdf")]
    engines: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let engines = EngineKind::parse_list(&args.engines).context("parsing --engines")?;
    if engines.is_empty() {
        bail!("no storage engine given");
    }

    let dataset = open_dataset(&args.dataset, &engines)
        .with_context(|| format!("opening {}", args.dataset))?;
    let metadata = dataset.metadata();

    println!("Dataset: {}", dataset.source());
    println!("Engine:  {}", dataset.engine_name());

    println!("\nDimensions:");
    for name in metadata.dimension_names() {
        let size = metadata.dimensions[&name].size;
        match metadata.coordinate(&name) {
            Some(values) if !values.is_empty() => {
                let (lo, hi) = values
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                println!("  {} = {}  [{} .. {}]", name, size, format_number(lo), format_number(hi));
            }
            _ => println!("  {} = {}", name, size),
        }
    }

    println!("\nData variables:");
    for name in metadata.data_variables() {
        let var = metadata.variable(&name)?;
        println!("  {} ({}) {:?}", name, var.dtype, var.dimensions);
        let mut keys: Vec<_> = var.attributes.keys().collect();
        keys.sort();
        for key in keys {
            println!("    {}: {}", key, serde_json::to_string(&var.attributes[key])?);
        }
    }

    println!("\nGlobal attributes:");
    let mut keys: Vec<_> = metadata.global_attributes.keys().collect();
    keys.sort();
    for key in keys {
        println!("  {}: {}", key, serde_json::to_string(&metadata.global_attributes[key])?);
    }

    Ok(())
}

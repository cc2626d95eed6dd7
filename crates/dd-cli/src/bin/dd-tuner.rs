//! Tuning driver: search the configuration space on the local device and
//! report (or persist) the winner.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dd_cli::{ModeArgs, ObservationArgs, Pipeline, TypePlanArgs};
use dd_gpu::GpuContext;
use dd_tune::{tune, Measurement, TunedCatalogue, TuningBounds};

#[derive(Parser, Debug)]
#[command(name = "dd-tuner", about = "Autotune the dedispersion kernels")]
struct Cli {
    #[command(flatten)]
    observation: ObservationArgs,

    #[command(flatten)]
    plan: TypePlanArgs,

    #[command(flatten)]
    mode: ModeArgs,

    /// Timed launches per candidate (after one warm-up)
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Print only the winning configuration
    #[arg(long)]
    best: bool,

    /// Append the winner to this tuning catalogue
    #[arg(long)]
    catalogue: Option<PathBuf>,

    /// Zapped-channels file
    #[arg(long)]
    zapped_channels: Option<PathBuf>,

    // Search bounds.
    #[arg(long, default_value_t = 8)]
    min_threads: usize,

    #[arg(long, default_value_t = 256)]
    max_threads: usize,

    #[arg(long, default_value_t = 8)]
    max_rows: usize,

    #[arg(long, default_value_t = 256)]
    max_columns: usize,

    #[arg(long, default_value_t = 64)]
    max_items: usize,

    #[arg(long, default_value_t = 8)]
    max_sample_items: usize,

    #[arg(long, default_value_t = 8)]
    max_dm_items: usize,

    #[arg(long, default_value_t = 8)]
    max_unroll: usize,

    #[arg(long, default_value_t = 1)]
    vector: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mode = cli.mode.mode();
    let pipeline = Pipeline::prepare(&cli.observation, &cli.plan, mode, cli.zapped_channels.as_ref())?;
    let bounds = TuningBounds {
        min_threads: cli.min_threads,
        max_threads: cli.max_threads,
        max_rows: cli.max_rows,
        max_columns: cli.max_columns,
        max_items: cli.max_items,
        max_sample_items: cli.max_sample_items,
        max_dm_items: cli.max_dm_items,
        max_unroll: cli.max_unroll,
        vector_width: cli.vector,
    };

    let ctx = GpuContext::new_blocking().context("initializing the device")?;
    let outcome = tune(
        &ctx,
        &pipeline.obs,
        &pipeline.plan,
        mode,
        pipeline.shifts(),
        &pipeline.zapped,
        &pipeline.beam_mapping,
        &bounds,
        cli.iterations,
    )?;

    let nr_dms = pipeline.obs.nr_dms(mode.coarse());
    if cli.best {
        let best = outcome
            .best
            .context("no candidate configuration survived the search")?;
        println!("{} {}", nr_dms, best.conf);
    } else {
        println!();
        println!("# device nrDMs *configuration* GFLOP/s time stdDeviation COV");
        println!();
        for m in &outcome.measurements {
            print_measurement(ctx.device_name(), nr_dms, m);
        }
        println!();
    }

    if let Some(path) = &cli.catalogue {
        let best = outcome
            .best
            .context("no candidate configuration survived the search")?;
        let mut catalogue = match TunedCatalogue::read(path) {
            Ok(catalogue) => catalogue,
            Err(dd_core::CoreError::FileNotFound { .. }) => TunedCatalogue::new(),
            Err(err) => return Err(err.into()),
        };
        catalogue.insert(ctx.device_name(), nr_dms, best.conf);
        catalogue.write(path)?;
        log::info!("catalogue updated: {}", path.display());
    }

    Ok(())
}

fn print_measurement(device: &str, nr_dms: usize, m: &Measurement) {
    println!(
        "{} {} {} {:.3} {:.6} {:.6} {:.6}",
        dd_tune::catalogue_key(device),
        nr_dms,
        m.conf,
        m.gflops,
        m.mean,
        m.std_dev,
        m.cov,
    );
}

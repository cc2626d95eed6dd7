//! Production driver: dedisperse batches with the catalogue's winning kernel
//! and write one time series per trial DM.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use dd_cli::{generate_input, ObservationArgs, Pipeline, TypePlanArgs};
use dd_core::{layout, Mode};
use dd_dsp::PackedBuffer;
use dd_gpu::{work_sizes, DeviceBuffer, GpuContext, Kernel};
use dd_tune::{roles, TunedCatalogue};

#[derive(Parser, Debug)]
#[command(name = "dd-series", about = "Produce dedispersed time series")]
struct Cli {
    #[command(flatten)]
    observation: ObservationArgs,

    #[command(flatten)]
    plan: TypePlanArgs,

    /// Tuning catalogue holding the winning configuration for this device
    #[arg(long)]
    catalogue: PathBuf,

    /// Raw packed input file (padded little-endian word layout); when absent
    /// a dispersed test pulse is synthesised
    #[arg(long)]
    input: Option<PathBuf>,

    /// DM of the synthesised pulse
    #[arg(long, default_value_t = 0.0)]
    pulse_dm: f32,

    /// Batches to process
    #[arg(long, default_value_t = 1)]
    batches: usize,

    /// Zapped-channels file
    #[arg(long)]
    zapped_channels: Option<PathBuf>,

    /// Output directory, one file per DM
    #[arg(long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let pipeline = Pipeline::prepare(
        &cli.observation,
        &cli.plan,
        Mode::SingleStep,
        cli.zapped_channels.as_ref(),
    )?;
    let obs = &pipeline.obs;
    let plan = &pipeline.plan;

    let ctx = GpuContext::new_blocking().context("initializing the device")?;
    let catalogue = TunedCatalogue::read(&cli.catalogue)?;
    let conf = *catalogue
        .lookup(ctx.device_name(), obs.nr_dms(false))
        .with_context(|| {
            format!(
                "no tuned configuration for {} with {} DMs in {}",
                ctx.device_name(),
                obs.nr_dms(false),
                cli.catalogue.display()
            )
        })?;
    log::info!("tuned configuration: {conf}");

    let source = dd_kernel::generate(Mode::SingleStep, &conf, plan, obs, pipeline.shifts())?;
    let kernel = Kernel::compile(&ctx, &source, "dedispersion", roles(Mode::SingleStep))
        .context("compiling the tuned kernel")?;

    let input = match &cli.input {
        Some(path) => read_input(path, obs, plan)?,
        None => synthesize_pulse(&pipeline, cli.pulse_dm),
    };

    // Session buffers: static tables once, input refreshed per batch.
    let mode_roles = roles(Mode::SingleStep);
    let input_d = ctx.create_buffer(
        "dispersed",
        (input.words().len() * 4) as u64,
        mode_roles[0],
    )?;
    let output_len = layout::dedispersed_len_elems(obs);
    let output_d = ctx.create_buffer("dedispersed", (output_len * 4) as u64, mode_roles[1])?;
    let mapping_d = ctx.create_buffer(
        "beam mapping",
        (pipeline.beam_mapping.len() * 4) as u64,
        mode_roles[2],
    )?;
    ctx.write_buffer_u32(&mapping_d, &pipeline.beam_mapping);
    let zapped_d = ctx.create_buffer(
        "zapped channels",
        (pipeline.zapped.len() * 4) as u64,
        mode_roles[3],
    )?;
    ctx.write_buffer_u32(&zapped_d, &pipeline.zapped);
    let shifts_d = ctx.create_buffer(
        "shifts",
        (pipeline.shifts().len() * 4) as u64,
        mode_roles[4],
    )?;
    ctx.write_buffer_f32(&shifts_d, pipeline.shifts());

    let buffers: Vec<&DeviceBuffer> = vec![&input_d, &output_d, &mapping_d, &zapped_d, &shifts_d];
    let bind = kernel.bind(&ctx, &buffers);
    let (global, local) = work_sizes(Mode::SingleStep, obs, &conf);

    fs::create_dir_all(&cli.output)?;
    let mut writers = open_writers(&cli.output, obs.nr_dms(false))?;

    for batch in 0..cli.batches {
        ctx.write_buffer_u32(&input_d, input.words());
        let elapsed = kernel.run(&ctx, &bind, global, local)?;
        log::info!(
            "batch {batch}: {:.3} ms",
            elapsed.as_secs_f64() * 1e3
        );
        let output = ctx.read_buffer_u32(&output_d)?;
        append_series(&mut writers, obs, plan.output, &output)?;
    }

    for writer in &mut writers {
        writer.flush()?;
    }
    Ok(())
}

fn read_input(path: &PathBuf, obs: &dd_core::Observation, plan: &dd_core::TypePlan) -> Result<PackedBuffer> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let expected = layout::input_len_words(obs, plan, false) * 4;
    if bytes.len() != expected {
        bail!(
            "input file {} holds {} bytes, the observation needs {expected}",
            path.display(),
            bytes.len()
        );
    }
    Ok(PackedBuffer::from_bytes(
        &bytes,
        obs,
        plan,
        false,
    ))
}

/// A dispersed pulse at the requested DM over an empty background.
fn synthesize_pulse(pipeline: &Pipeline, dm: f32) -> PackedBuffer {
    let obs = &pipeline.obs;
    let plan = &pipeline.plan;
    let mut input = generate_input(obs, plan, false, None);
    let peak = if plan.input.is_float() {
        1.0f32.to_bits()
    } else {
        (1u64 << plan.input_bits.min(8)) as u32 - 1
    };
    for beam in 0..obs.nr_beams() {
        for channel in 0..obs.nr_channels() {
            let delay = (dm * pipeline.shifts()[channel]) as usize;
            input.set(beam * obs.nr_channels() + channel, delay, peak);
        }
    }
    input
}

fn open_writers(dir: &PathBuf, nr_dms: usize) -> Result<Vec<std::io::BufWriter<fs::File>>> {
    (0..nr_dms)
        .map(|dm| {
            let path = dir.join(format!("dm_{dm:05}.tsv"));
            Ok(std::io::BufWriter::new(fs::File::create(path)?))
        })
        .collect()
}

fn append_series(
    writers: &mut [std::io::BufWriter<fs::File>],
    obs: &dd_core::Observation,
    output_type: dd_core::ScalarType,
    output: &[u32],
) -> Result<()> {
    let row = layout::output_row_elems(obs, false);
    let samples = obs.nr_samples_per_batch(false) / obs.downsampling();
    // First synthesized beam only; downstream search consumes one beam per
    // series file.
    for (dm, writer) in writers.iter_mut().enumerate() {
        for sample in 0..samples {
            let value = output_type.decode_word(output[dm * row + sample]);
            writeln!(writer, "{value}")?;
        }
    }
    Ok(())
}

//! Correctness test driver: run one generated kernel against the scalar
//! reference and count wrong samples.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use dd_cli::{generate_input, generate_subbanded, ConfigArgs, ModeArgs, ObservationArgs, Pipeline, TypePlanArgs};
use dd_core::{layout, Mode};
use dd_dsp::{
    compare_output, dedispersion_direct, dedispersion_step_one, dedispersion_step_two,
    ComparisonReport,
};
use dd_gpu::{work_sizes, DeviceBuffer, GpuContext, Kernel};
use dd_tune::roles;

#[derive(Parser, Debug)]
#[command(name = "dd-test", about = "Compare a generated dedispersion kernel against the reference")]
struct Cli {
    #[command(flatten)]
    observation: ObservationArgs,

    #[command(flatten)]
    plan: TypePlanArgs,

    #[command(flatten)]
    mode: ModeArgs,

    #[command(flatten)]
    config: ConfigArgs,

    /// Zapped-channels file (one channel index per line)
    #[arg(long)]
    zapped_channels: Option<PathBuf>,

    /// Fill the input with seeded random samples instead of a ramp
    #[arg(long)]
    random: bool,

    /// Print the generated kernel source
    #[arg(long)]
    print_code: bool,

    /// Relative comparison tolerance
    #[arg(long, default_value_t = 1.0e-6)]
    tolerance: f64,
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();
    let mode = cli.mode.mode();
    let pipeline = Pipeline::prepare(&cli.observation, &cli.plan, mode, cli.zapped_channels.as_ref())?;
    let conf = cli.config.build();
    let seed = cli.random.then_some(0xdd);

    let source = dd_kernel::generate(
        mode,
        &conf,
        &pipeline.plan,
        &pipeline.obs,
        pipeline.shifts(),
    )?;
    if cli.print_code {
        println!("{source}");
    }

    let ctx = GpuContext::new_blocking().context("initializing the device")?;
    let kernel = Kernel::compile(&ctx, &source, mode.entry_point(), roles(mode))
        .context("compiling the generated kernel")?;

    let obs = &pipeline.obs;
    let plan = &pipeline.plan;
    let report = match mode {
        Mode::SingleStep => {
            let input = generate_input(obs, plan, false, seed);
            let mut expected = vec![0u32; layout::dedispersed_len_elems(obs)];
            dedispersion_direct(
                obs,
                plan,
                &pipeline.zapped,
                &pipeline.beam_mapping,
                &input,
                pipeline.shifts(),
                &mut expected,
            );
            let actual = launch(
                &ctx,
                &kernel,
                mode,
                &pipeline,
                &conf,
                &[
                    Some(input.words()),
                    None,
                    Some(pipeline.beam_mapping.as_slice()),
                    Some(pipeline.zapped.as_slice()),
                    Some(bytemuck::cast_slice(pipeline.shifts())),
                ],
                expected.len(),
            )?;
            compare_output(
                &expected,
                &actual,
                plan.output,
                obs.nr_synthesized_beams() * obs.nr_dms(false),
                obs.nr_samples_per_batch(false) / obs.downsampling(),
                layout::output_row_elems(obs, false),
                cli.tolerance,
            )
        }
        Mode::StepOne => {
            let input = generate_input(obs, plan, true, seed);
            let mut expected = vec![0u32; layout::subbanded_len_elems(obs)];
            dedispersion_step_one(
                obs,
                plan,
                &pipeline.zapped,
                &input,
                pipeline.shifts(),
                &mut expected,
            );
            let actual = launch(
                &ctx,
                &kernel,
                mode,
                &pipeline,
                &conf,
                &[
                    Some(input.words()),
                    None,
                    Some(pipeline.zapped.as_slice()),
                    Some(bytemuck::cast_slice(pipeline.shifts())),
                ],
                expected.len(),
            )?;
            compare_output(
                &expected,
                &actual,
                plan.output,
                obs.nr_beams() * obs.nr_dms(true) * obs.nr_subbands(),
                obs.nr_samples_per_batch(true) / obs.downsampling(),
                layout::subbanded_row_elems(obs),
                cli.tolerance,
            )
        }
        Mode::StepTwo => {
            let subbanded = generate_subbanded(obs, plan, 0xdd);
            let mut expected = vec![0u32; layout::step_two_len_elems(obs)];
            dedispersion_step_two(
                obs,
                plan,
                &pipeline.beam_mapping,
                &subbanded,
                pipeline.shifts(),
                &mut expected,
            );
            let actual = launch(
                &ctx,
                &kernel,
                mode,
                &pipeline,
                &conf,
                &[
                    Some(subbanded.as_slice()),
                    None,
                    Some(pipeline.beam_mapping.as_slice()),
                    Some(bytemuck::cast_slice(pipeline.shifts())),
                ],
                expected.len(),
            )?;
            compare_output(
                &expected,
                &actual,
                plan.output,
                obs.nr_synthesized_beams() * obs.nr_dms(true) * obs.nr_dms(false),
                obs.nr_samples_per_batch(false) / obs.downsampling(),
                layout::output_row_elems(obs, false),
                cli.tolerance,
            )
        }
    };

    Ok(verdict(&report))
}

/// Upload the positional arguments (None marks the output slot), launch once
/// and read the output back.
fn launch(
    ctx: &GpuContext,
    kernel: &Kernel,
    mode: Mode,
    pipeline: &Pipeline,
    conf: &dd_core::DedispersionConfig,
    args: &[Option<&[u32]>],
    output_len: usize,
) -> Result<Vec<u32>> {
    let mode_roles = roles(mode);
    let mut buffers: Vec<DeviceBuffer> = Vec::with_capacity(args.len());
    let mut output_slot = 0;
    for (position, arg) in args.iter().enumerate() {
        let role = mode_roles[position];
        let buffer = match arg {
            Some(data) => {
                let buffer = ctx.create_buffer("argument", (data.len() * 4) as u64, role)?;
                ctx.write_buffer_u32(&buffer, data);
                buffer
            }
            None => {
                output_slot = position;
                ctx.create_buffer("output", (output_len * 4) as u64, role)?
            }
        };
        buffers.push(buffer);
    }

    let refs: Vec<&DeviceBuffer> = buffers.iter().collect();
    let bind = kernel.bind(ctx, &refs);
    let (global, local) = work_sizes(mode, &pipeline.obs, conf);
    let elapsed = kernel.run(ctx, &bind, global, local)?;
    log::info!("kernel ran in {:.3} ms", elapsed.as_secs_f64() * 1e3);
    Ok(ctx.read_buffer_u32(&buffers[output_slot])?)
}

fn verdict(report: &ComparisonReport) -> ExitCode {
    if report.passed() {
        println!("TEST PASSED");
        ExitCode::SUCCESS
    } else {
        println!(
            "Wrong samples: {} ({:.6}%).",
            report.wrong,
            report.percentage()
        );
        ExitCode::FAILURE
    }
}

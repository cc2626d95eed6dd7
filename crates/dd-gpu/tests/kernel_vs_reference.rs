//! Generated kernels against the scalar references, on whatever adapter the
//! machine offers. Every test skips cleanly when no device is available.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use dd_core::io::generate_beam_mapping;
use dd_core::{layout, DedispersionConfig, Mode, Observation, ScalarType, TypePlan};
use dd_dsp::{
    compare_output, dedispersion_direct, dedispersion_step_one, dedispersion_step_two,
    derive_batches, PackedBuffer,
};
use dd_gpu::{work_sizes, BufferRole, GpuContext, Kernel};

fn context() -> Option<GpuContext> {
    match GpuContext::new_blocking() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("no GPU adapter, skipping: {err}");
            None
        }
    }
}

fn observation(samples: usize) -> Observation {
    let mut obs = Observation::new(2, 2, samples, 1, 128).unwrap();
    obs.set_frequency_range(4, 32, 45.0, 0.25).unwrap();
    obs.set_dm_range(8, 0.0, 0.5, false);
    obs.set_dm_range(2, 0.0, 1.0, true);
    obs
}

fn random_input(obs: &Observation, plan: &TypePlan, coarse: bool, seed: u64) -> PackedBuffer {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut input = PackedBuffer::for_input(obs, plan, coarse);
    let limit = 1u64 << plan.input_bits.min(8);
    for row in 0..obs.nr_beams() * obs.nr_channels() {
        for sample in 0..obs.nr_samples_per_dispersed_batch(coarse) {
            let raw = if plan.input.is_float() {
                rng.random::<f32>().to_bits()
            } else {
                rng.random_range(0..limit) as u32
            };
            input.set(row, sample, raw);
        }
    }
    input
}

fn run_direct(ctx: &GpuContext, plan: &TypePlan, conf: &DedispersionConfig) {
    let mut obs = observation(256);
    let (shifts, _) = derive_batches(&mut obs, Mode::SingleStep);
    let zapped = {
        let mut mask = vec![0u32; obs.padded_nr_channels()];
        mask[3] = 1;
        mask
    };
    let mapping = generate_beam_mapping(&obs, false);
    let input = random_input(&obs, plan, false, 42);

    let mut expected = vec![0u32; layout::dedispersed_len_elems(&obs)];
    dedispersion_direct(&obs, plan, &zapped, &mapping, &input, &shifts, &mut expected);

    let source = dd_kernel::generate_direct(conf, plan, &obs, &shifts).unwrap();
    let roles = [
        BufferRole::ReadOnly,
        BufferRole::WriteOnly,
        BufferRole::ReadOnly,
        BufferRole::ReadOnly,
        BufferRole::ReadOnly,
    ];
    let kernel = Kernel::compile(ctx, &source, "dedispersion", &roles)
        .unwrap_or_else(|err| panic!("compile failed: {err}\n{source}"));

    let input_d = ctx
        .create_buffer("input", (input.words().len() * 4) as u64, roles[0])
        .unwrap();
    let output_d = ctx
        .create_buffer("output", (expected.len() * 4) as u64, roles[1])
        .unwrap();
    let mapping_d = ctx
        .create_buffer("beam mapping", (mapping.len() * 4) as u64, roles[2])
        .unwrap();
    let zapped_d = ctx
        .create_buffer("zapped channels", (zapped.len() * 4) as u64, roles[3])
        .unwrap();
    let shifts_d = ctx
        .create_buffer("shifts", (shifts.len() * 4) as u64, roles[4])
        .unwrap();
    ctx.write_buffer_u32(&input_d, input.words());
    ctx.write_buffer_u32(&mapping_d, &mapping);
    ctx.write_buffer_u32(&zapped_d, &zapped);
    ctx.write_buffer(&shifts_d, bytemuck::cast_slice(&shifts));

    let bind = kernel.bind(ctx, &[&input_d, &output_d, &mapping_d, &zapped_d, &shifts_d]);
    let (global, local) = work_sizes(Mode::SingleStep, &obs, conf);
    kernel.run(ctx, &bind, global, local).unwrap();

    let actual = ctx.read_buffer_u32(&output_d).unwrap();
    let report = compare_output(
        &expected,
        &actual,
        plan.output,
        obs.nr_synthesized_beams() * obs.nr_dms(false),
        obs.nr_samples_per_batch(false),
        layout::output_row_elems(&obs, false),
        1.0e-6,
    );
    assert!(
        report.passed(),
        "wrong samples: {} ({:.3}%)\n{source}",
        report.wrong,
        report.percentage()
    );
}

#[test]
fn direct_global_memory_matches_reference() {
    let Some(ctx) = context() else { return };
    let conf = DedispersionConfig {
        threads_d0: 32,
        threads_d1: 2,
        items_d0: 2,
        items_d1: 2,
        unroll: 2,
        ..Default::default()
    };
    run_direct(&ctx, &TypePlan::unsigned_byte(), &conf);
}

#[test]
fn direct_tile_cache_matches_reference() {
    let Some(ctx) = context() else { return };
    let conf = DedispersionConfig {
        threads_d0: 32,
        threads_d1: 2,
        items_d0: 2,
        items_d1: 2,
        unroll: 2,
        local_mem: true,
        ..Default::default()
    };
    run_direct(&ctx, &TypePlan::unsigned_byte(), &conf);
}

#[test]
fn direct_sub_byte_matches_reference() {
    let Some(ctx) = context() else { return };
    let conf = DedispersionConfig {
        threads_d0: 64,
        threads_d1: 1,
        items_d0: 1,
        items_d1: 4,
        ..Default::default()
    };
    let plan = TypePlan::new(4, ScalarType::U32, ScalarType::F32, ScalarType::F32).unwrap();
    run_direct(&ctx, &plan, &conf);
    let signed = TypePlan::new(2, ScalarType::I32, ScalarType::I32, ScalarType::I32).unwrap();
    run_direct(&ctx, &signed, &conf);
}

#[test]
fn direct_float_input_matches_reference() {
    let Some(ctx) = context() else { return };
    let conf = DedispersionConfig {
        threads_d0: 32,
        threads_d1: 4,
        items_d0: 4,
        items_d1: 1,
        unroll: 4,
        ..Default::default()
    };
    run_direct(&ctx, &TypePlan::float(), &conf);
}

#[test]
fn step_one_matches_reference() {
    let Some(ctx) = context() else { return };
    let plan = TypePlan::unsigned_byte();
    let mut obs = observation(256);
    let (shifts, _) = derive_batches(&mut obs, Mode::StepOne);
    let zapped = vec![0u32; obs.padded_nr_channels()];
    let input = random_input(&obs, &plan, true, 7);

    let mut expected = vec![0u32; layout::subbanded_len_elems(&obs)];
    dedispersion_step_one(&obs, &plan, &zapped, &input, &shifts, &mut expected);

    let conf = DedispersionConfig {
        threads_d0: 32,
        threads_d1: 1,
        items_d0: 2,
        items_d1: 2,
        unroll: 2,
        ..Default::default()
    };
    let source = dd_kernel::generate_step_one(&conf, &plan, &obs, &shifts).unwrap();
    let roles = [
        BufferRole::ReadOnly,
        BufferRole::WriteOnly,
        BufferRole::ReadOnly,
        BufferRole::ReadOnly,
    ];
    let kernel = Kernel::compile(&ctx, &source, "dedispersionStepOne", &roles)
        .unwrap_or_else(|err| panic!("compile failed: {err}\n{source}"));

    let input_d = ctx
        .create_buffer("input", (input.words().len() * 4) as u64, roles[0])
        .unwrap();
    let output_d = ctx
        .create_buffer("subbanded", (expected.len() * 4) as u64, roles[1])
        .unwrap();
    let zapped_d = ctx
        .create_buffer("zapped channels", (zapped.len() * 4) as u64, roles[2])
        .unwrap();
    let shifts_d = ctx
        .create_buffer("shifts", (shifts.len() * 4) as u64, roles[3])
        .unwrap();
    ctx.write_buffer_u32(&input_d, input.words());
    ctx.write_buffer_u32(&zapped_d, &zapped);
    ctx.write_buffer(&shifts_d, bytemuck::cast_slice(&shifts));

    let bind = kernel.bind(&ctx, &[&input_d, &output_d, &zapped_d, &shifts_d]);
    let (global, local) = work_sizes(Mode::StepOne, &obs, &conf);
    kernel.run(&ctx, &bind, global, local).unwrap();

    let actual = ctx.read_buffer_u32(&output_d).unwrap();
    let report = compare_output(
        &expected,
        &actual,
        plan.output,
        obs.nr_beams() * obs.nr_dms(true) * obs.nr_subbands(),
        obs.nr_samples_per_batch(true),
        layout::subbanded_row_elems(&obs),
        1.0e-6,
    );
    assert!(report.passed(), "wrong samples: {}\n{source}", report.wrong);
}

#[test]
fn step_two_matches_reference() {
    let Some(ctx) = context() else { return };
    let plan = TypePlan::unsigned_byte();
    let mut obs = observation(256);
    let (_, shifts_two) = derive_batches(&mut obs, Mode::StepTwo);
    let mapping = generate_beam_mapping(&obs, true);

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let subbanded: Vec<u32> = (0..layout::subbanded_len_elems(&obs))
        .map(|_| (rng.random::<f32>() * 64.0).to_bits())
        .collect();

    let mut expected = vec![0u32; layout::step_two_len_elems(&obs)];
    dedispersion_step_two(&obs, &plan, &mapping, &subbanded, &shifts_two, &mut expected);

    for local_mem in [false, true] {
        let conf = DedispersionConfig {
            threads_d0: 32,
            threads_d1: 2,
            items_d0: 2,
            items_d1: 2,
            local_mem,
            ..Default::default()
        };
        let source = dd_kernel::generate_step_two(&conf, &plan, &obs, &shifts_two).unwrap();
        let roles = [
            BufferRole::ReadOnly,
            BufferRole::WriteOnly,
            BufferRole::ReadOnly,
            BufferRole::ReadOnly,
        ];
        let kernel = Kernel::compile(&ctx, &source, "dedispersionStepTwo", &roles)
            .unwrap_or_else(|err| panic!("compile failed: {err}\n{source}"));

        let input_d = ctx
            .create_buffer("subbanded", (subbanded.len() * 4) as u64, roles[0])
            .unwrap();
        let output_d = ctx
            .create_buffer("dedispersed", (expected.len() * 4) as u64, roles[1])
            .unwrap();
        let mapping_d = ctx
            .create_buffer("beam mapping", (mapping.len() * 4) as u64, roles[2])
            .unwrap();
        let shifts_d = ctx
            .create_buffer("shifts", (shifts_two.len() * 4) as u64, roles[3])
            .unwrap();
        ctx.write_buffer_u32(&input_d, &subbanded);
        ctx.write_buffer_u32(&mapping_d, &mapping);
        ctx.write_buffer(&shifts_d, bytemuck::cast_slice(&shifts_two));

        let bind = kernel.bind(&ctx, &[&input_d, &output_d, &mapping_d, &shifts_d]);
        let (global, local) = work_sizes(Mode::StepTwo, &obs, &conf);
        kernel.run(&ctx, &bind, global, local).unwrap();

        let actual = ctx.read_buffer_u32(&output_d).unwrap();
        let report = compare_output(
            &expected,
            &actual,
            plan.output,
            obs.nr_synthesized_beams() * obs.nr_dms(true) * obs.nr_dms(false),
            obs.nr_samples_per_batch(false),
            layout::output_row_elems(&obs, false),
            1.0e-6,
        );
        assert!(
            report.passed(),
            "local_mem {local_mem}: wrong samples {}\n{source}",
            report.wrong
        );
    }
}

#[test]
fn broken_source_surfaces_as_compile_error() {
    let Some(ctx) = context() else { return };
    let err = Kernel::compile(&ctx, "fn nonsense( {", "dedispersion", &[]);
    assert!(matches!(err, Err(dd_gpu::GpuError::Compile(_))));
}

//! Subband dedispersion kernel, step one: channels to subbands on the coarse
//! DM grid.

use dd_core::{layout, CoreResult, DedispersionConfig, Observation, TypePlan};

use crate::assemble::{assemble, BodyTemplates};
use crate::fragments::{convert, guard, lit_f32, load_expr, zero};
use crate::validate;

/// Generate the WGSL source of the `dedispersionStepOne` entry point.
///
/// Dimension 2 of the work grid folds `beam * nr_subbands + subband`; shifts
/// are taken relative to each channel's subband high edge so that the
/// residual inter-subband delay is left for step two.
pub fn generate_step_one(
    conf: &DedispersionConfig,
    plan: &TypePlan,
    obs: &Observation,
    shifts: &[f32],
) -> CoreResult<String> {
    validate(conf, obs.nr_channels_per_subband(), obs.nr_dms(true))?;

    let grid = *obs.dms(true);
    let first = lit_f32(grid.first);
    let step = lit_f32(grid.step);
    let inter = plan.intermediate.wgsl_name();
    let in_ty = if plan.packed_input() { "u32" } else { "f32" };
    let out_ty = plan.output.wgsl_name();

    let samples = obs.nr_samples_per_batch(true) / obs.downsampling();
    let guarded = samples % conf.block_samples() != 0;
    let row_words = layout::input_row_words(obs, plan, true);
    let beam_words = layout::input_beam_words(obs, plan, true);
    let out_row = layout::subbanded_row_elems(obs);
    let out_dm = obs.nr_subbands() * out_row;
    let out_beam = obs.nr_dms(true) * out_dm;
    let nr_subbands = obs.nr_subbands();
    let cps = obs.nr_channels_per_subband();
    let block_samples = conf.block_samples();
    let block_dms = conf.block_dms();
    let total_threads = conf.total_threads();

    let base =
        format!("(beam * {beam_words}u) + ((channel + <%UNROLL%>) * {row_words}u)");
    // Relative delay coefficient for one channel of the current subband.
    let coefficient = format!(
        "(shifts[channel + <%UNROLL%>] - shifts[((subband + 1u) * {cps}u) - 1u])"
    );

    let mut code = format!(
        "@group(0) @binding(0) var<storage, read> input: array<{in_ty}>;\n\
         @group(0) @binding(1) var<storage, read_write> output: array<{out_ty}>;\n\
         @group(0) @binding(2) var<storage, read> zapped_channels: array<u32>;\n\
         @group(0) @binding(3) var<storage, read> shifts: array<f32>;\n\n"
    );
    if conf.local_mem {
        let tile_size = block_samples
            + (shifts[0] * (grid.first + (block_dms as f32 * grid.step))) as usize;
        code.push_str(&format!(
            "var<workgroup> tile: array<{inter}, {tile_size}>;\n\n"
        ));
    }
    code.push_str(&format!(
        "@compute @workgroup_size({}, {}, 1)\n\
         fn dedispersionStepOne(@builtin(workgroup_id) group_id: vec3<u32>, @builtin(local_invocation_id) local_id: vec3<u32>) {{\n",
        conf.threads_d0, conf.threads_d1
    ));
    code.push_str(&format!(
        "let beam = group_id.z / {nr_subbands}u;\n\
         let subband = group_id.z % {nr_subbands}u;\n\
         let dm = (group_id.y * {block_dms}u) + local_id.y;\n\
         let sample = (group_id.x * {block_samples}u) + local_id.x;\n"
    ));
    if conf.local_mem {
        code.push_str("var in_tile: u32 = 0u;\nvar in_glob: u32 = 0u;\n");
    }
    code.push_str("<%DEFS%>\n");
    let loop_header = format!(
        "for (var channel: u32 = subband * {cps}u; channel < (subband + 1u) * {cps}u; channel += {}u) {{\n",
        conf.unroll
    );
    if conf.local_mem {
        code.push_str(&format!(
            "{loop_header}\
             var min_shift: u32 = 0u;\n\
             <%DEFS_SHIFT%>\
             var diff_shift: u32 = 0u;\n\n\
             <%UNROLLED_LOOP%>}}\n\
             <%STORES%>}}\n"
        ));
    } else {
        code.push_str(&format!(
            "{loop_header}\
             <%DEFS_SHIFT%>\
             <%UNROLLED_LOOP%>}}\n\
             <%STORES%>}}\n"
        ));
    }

    let shift_value = format!(
        "u32({coefficient} * ({first} + (f32(dm + <%DM_OFFSET%>) * {step})))"
    );
    let shift = if conf.local_mem {
        format!("shift_dm<%DM_NUM%> = {shift_value} - min_shift;\n")
    } else {
        format!("shift_dm<%DM_NUM%> = {shift_value};\n")
    };

    let sum_body = if conf.local_mem {
        "sum<%NUM%>_dm<%DM_NUM%> += tile[(local_id.x + <%OFFSET%>) + shift_dm<%DM_NUM%>];\n"
            .to_string()
    } else {
        format!(
            "sum<%NUM%>_dm<%DM_NUM%> += {};\n",
            load_expr(
                plan,
                plan.intermediate,
                &base,
                "sample + <%OFFSET%> + shift_dm<%DM_NUM%>"
            )
        )
    };

    let unrolled = if conf.local_mem {
        let dispersed_limit = obs.nr_samples_per_dispersed_batch(true) / obs.downsampling();
        let tile_load = load_expr(plan, plan.intermediate, &base, "in_glob");
        let mut body = format!(
            "if (zapped_channels[channel + <%UNROLL%>] == 0u) {{\n\
             min_shift = u32({coefficient} * ({first} + (f32(group_id.y * {block_dms}u) * {step})));\n\
             <%SHIFTS%>\
             diff_shift = u32({coefficient} * ({first} + (f32((group_id.y * {block_dms}u) + {last}u) * {step}))) - min_shift;\n\n\
             in_tile = (local_id.y * {t0}u) + local_id.x;\n\
             in_glob = ((group_id.x * {block_samples}u) + in_tile) + min_shift;\n\
             while ((in_tile < ({block_samples}u + diff_shift)) && (in_glob < {dispersed_limit}u)) {{\n\
             tile[in_tile] = {tile_load};\n\
             in_tile += {total_threads}u;\n\
             in_glob += {total_threads}u;\n\
             }}\n\
             }}\n\
             workgroupBarrier();\n\
             if (zapped_channels[channel + <%UNROLL%>] == 0u) {{\n\
             <%SUMS%>\
             }}\n",
            last = block_dms - 1,
            t0 = conf.threads_d0,
        );
        if conf.unroll > 1 {
            body.push_str("workgroupBarrier();\n");
        }
        body
    } else {
        "if (zapped_channels[channel + <%UNROLL%>] == 0u) {\n<%SHIFTS%>\n<%SUMS%>}\n\n".to_string()
    };

    let templates = BodyTemplates {
        def: format!(
            "var sum<%NUM%>_dm<%DM_NUM%>: {inter} = {};\n",
            zero(plan.intermediate)
        ),
        def_shift: "var shift_dm<%DM_NUM%>: u32 = 0u;\n".to_string(),
        unrolled,
        shift,
        sum: guard(guarded, samples, sum_body),
        store: guard(
            guarded,
            samples,
            format!(
                "output[(beam * {out_beam}u) + ((dm + <%DM_OFFSET%>) * {out_dm}u) + (subband * {out_row}u) + (sample + <%OFFSET%>)] = {};\n",
                convert(
                    "sum<%NUM%>_dm<%DM_NUM%>".to_string(),
                    plan.intermediate,
                    plan.output
                )
            ),
        ),
    };

    Ok(assemble(&code, conf, &templates))
}

//! Subband dedispersion kernel, step two: the fine DM grid swept over the
//! subbanded series.

use dd_core::{layout, CoreResult, DedispersionConfig, Observation, TypePlan};

use crate::assemble::{assemble, BodyTemplates};
use crate::fragments::{convert, guard, lit_f32, zero};
use crate::validate;

/// Generate the WGSL source of the `dedispersionStepTwo` entry point.
///
/// The subbanded input already carries the plan's output type; sums are
/// accumulated in the intermediate type and cast back at the store. There is
/// no channel zapping. Dimension 2 folds
/// `synthesized beam * nr_dms_coarse + coarse DM`.
pub fn generate_step_two(
    conf: &DedispersionConfig,
    plan: &TypePlan,
    obs: &Observation,
    shifts: &[f32],
) -> CoreResult<String> {
    validate(conf, obs.nr_subbands(), obs.nr_dms(false))?;

    let grid = *obs.dms(false);
    let first = lit_f32(grid.first);
    let step = lit_f32(grid.step);
    let data_ty = plan.output.wgsl_name();
    let inter = plan.intermediate.wgsl_name();

    let samples = obs.nr_samples_per_batch(false) / obs.downsampling();
    let guarded = samples % conf.block_samples() != 0;
    let in_row = layout::subbanded_row_elems(obs);
    let in_dm = obs.nr_subbands() * in_row;
    let in_beam = obs.nr_dms(true) * in_dm;
    let out_row = layout::output_row_elems(obs, false);
    let out_coarse = obs.nr_dms(false) * out_row;
    let out_beam = obs.nr_dms(true) * out_coarse;
    let nr_subbands = obs.nr_subbands();
    let nr_coarse = obs.nr_dms(true);
    let padded_subbands = obs.padded_nr_subbands();
    let block_samples = conf.block_samples();
    let block_dms = conf.block_dms();
    let total_threads = conf.total_threads();

    let base = format!(
        "(beam_mapping[(sbeam * {padded_subbands}u) + (channel + <%UNROLL%>)] * {in_beam}u) + (first_step_dm * {in_dm}u) + ((channel + <%UNROLL%>) * {in_row}u)"
    );

    let mut code = format!(
        "@group(0) @binding(0) var<storage, read> input: array<{data_ty}>;\n\
         @group(0) @binding(1) var<storage, read_write> output: array<{data_ty}>;\n\
         @group(0) @binding(2) var<storage, read> beam_mapping: array<u32>;\n\
         @group(0) @binding(3) var<storage, read> shifts: array<f32>;\n\n"
    );
    if conf.local_mem {
        let tile_size = block_samples
            + (shifts[0] * (grid.first + (block_dms as f32 * grid.step))) as usize;
        code.push_str(&format!(
            "var<workgroup> tile: array<{data_ty}, {tile_size}>;\n\n"
        ));
    }
    code.push_str(&format!(
        "@compute @workgroup_size({}, {}, 1)\n\
         fn dedispersionStepTwo(@builtin(workgroup_id) group_id: vec3<u32>, @builtin(local_invocation_id) local_id: vec3<u32>) {{\n",
        conf.threads_d0, conf.threads_d1
    ));
    code.push_str(&format!(
        "let sbeam = group_id.z / {nr_coarse}u;\n\
         let first_step_dm = group_id.z % {nr_coarse}u;\n\
         let dm = (group_id.y * {block_dms}u) + local_id.y;\n\
         let sample = (group_id.x * {block_samples}u) + local_id.x;\n"
    ));
    if conf.local_mem {
        code.push_str("var in_tile: u32 = 0u;\nvar in_glob: u32 = 0u;\n");
    }
    code.push_str("<%DEFS%>\n");
    let loop_header = format!(
        "for (var channel: u32 = 0u; channel < {nr_subbands}u; channel += {}u) {{\n",
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
        "u32(shifts[channel + <%UNROLL%>] * ({first} + (f32(dm + <%DM_OFFSET%>) * {step})))"
    );
    let shift = if conf.local_mem {
        format!("shift_dm<%DM_NUM%> = {shift_value} - min_shift;\n")
    } else {
        format!("shift_dm<%DM_NUM%> = {shift_value};\n")
    };

    let sum_body = if conf.local_mem {
        format!(
            "sum<%NUM%>_dm<%DM_NUM%> += {};\n",
            convert(
                "tile[(local_id.x + <%OFFSET%>) + shift_dm<%DM_NUM%>]".to_string(),
                plan.output,
                plan.intermediate
            )
        )
    } else {
        format!(
            "sum<%NUM%>_dm<%DM_NUM%> += {};\n",
            convert(
                format!("input[{base} + (sample + <%OFFSET%> + shift_dm<%DM_NUM%>)]"),
                plan.output,
                plan.intermediate
            )
        )
    };

    let unrolled = if conf.local_mem {
        let load_limit = obs.nr_samples_per_batch(true) / obs.downsampling();
        let mut body = format!(
            "min_shift = u32(shifts[channel + <%UNROLL%>] * ({first} + (f32(group_id.y * {block_dms}u) * {step})));\n\
             <%SHIFTS%>\
             diff_shift = u32(shifts[channel + <%UNROLL%>] * ({first} + (f32((group_id.y * {block_dms}u) + {last}u) * {step}))) - min_shift;\n\n\
             in_tile = (local_id.y * {t0}u) + local_id.x;\n\
             in_glob = ((group_id.x * {block_samples}u) + in_tile) + min_shift;\n\
             while ((in_tile < ({block_samples}u + diff_shift)) && (in_glob < {load_limit}u)) {{\n\
             tile[in_tile] = input[{base} + in_glob];\n\
             in_tile += {total_threads}u;\n\
             in_glob += {total_threads}u;\n\
             }}\n\
             workgroupBarrier();\n\n\
             <%SUMS%>\n",
            last = block_dms - 1,
            t0 = conf.threads_d0,
        );
        if conf.unroll > 1 {
            body.push_str("workgroupBarrier();\n");
        }
        body
    } else {
        "<%SHIFTS%>\n<%SUMS%>\n".to_string()
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
                "output[(sbeam * {out_beam}u) + (first_step_dm * {out_coarse}u) + ((dm + <%DM_OFFSET%>) * {out_row}u) + (sample + <%OFFSET%>)] = {};\n",
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

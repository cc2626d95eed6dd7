//! Fragment helpers for the kernel templates: hole substitution, literal
//! formatting and the per-sample load expressions.

use dd_core::{ScalarType, TypePlan};

/// Replace every occurrence of a named hole.
pub(crate) fn fill(template: &str, hole: &str, value: &str) -> String {
    template.replace(hole, value)
}

/// Replace an additive index hole with a `u32` literal; a zero offset elides
/// the whole ` + <%HOLE%>` term so the emitted index stays minimal.
pub(crate) fn fill_offset(template: &str, hole: &str, offset: usize) -> String {
    if offset == 0 {
        template.replace(&format!(" + {hole}"), "")
    } else {
        template.replace(hole, &format!("{offset}u"))
    }
}

/// WGSL f32 literal with round-trip precision.
pub(crate) fn lit_f32(value: f32) -> String {
    format!("{value:?}f")
}

/// WGSL zero literal of a scalar type.
pub(crate) fn zero(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::F32 => "0.0",
        ScalarType::I32 => "0",
        ScalarType::U32 => "0u",
    }
}

/// Expression reading one input sample, converted to `target`.
///
/// `base` is an expression for the row's first word (first element for plain
/// `f32` input) and `sample` an expression for the sample index within the
/// row. Packed widths are unpacked with `extractBits`; signed plans use the
/// `i32` overload, which replicates the top payload bit through the high
/// bits.
pub(crate) fn load_expr(plan: &TypePlan, target: ScalarType, base: &str, sample: &str) -> String {
    let bits = plan.input_bits as usize;
    let (raw, raw_ty) = if !plan.packed_input() {
        (format!("input[{base} + ({sample})]"), ScalarType::F32)
    } else if bits == 32 {
        match plan.input {
            ScalarType::I32 => (
                format!("bitcast<i32>(input[{base} + ({sample})])"),
                ScalarType::I32,
            ),
            _ => (format!("input[{base} + ({sample})]"), ScalarType::U32),
        }
    } else {
        let spw = plan.samples_per_word();
        let word = format!("input[{base} + (({sample}) / {spw}u)]");
        let offset = if bits >= 8 {
            format!("{bits}u * (({sample}) % {spw}u)")
        } else {
            // MSB-first within each little-endian byte.
            let per_byte = 8 / bits;
            let lead = 8 - bits;
            format!(
                "(8u * ((({sample}) % {spw}u) / {per_byte}u)) + ({lead}u - ({bits}u * (({sample}) % {per_byte}u)))"
            )
        };
        if plan.input.is_signed() {
            (
                format!("extractBits(bitcast<i32>({word}), {offset}, {bits}u)"),
                ScalarType::I32,
            )
        } else {
            (
                format!("extractBits({word}, {offset}, {bits}u)"),
                ScalarType::U32,
            )
        }
    };
    convert(raw, raw_ty, target)
}

/// Wrap an expression in a scalar conversion when the types differ.
pub(crate) fn convert(expr: String, from: ScalarType, to: ScalarType) -> String {
    if from == to {
        expr
    } else {
        format!("{}({expr})", to.wgsl_name())
    }
}

/// Wrap a fragment in the sample-axis boundary predicate when the output tile
/// does not evenly divide the work grid.
pub(crate) fn guard(enabled: bool, limit: usize, body: String) -> String {
    if enabled {
        format!("if ((sample + <%OFFSET%>) < {limit}u) {{\n{body}}}\n")
    } else {
        body
    }
}

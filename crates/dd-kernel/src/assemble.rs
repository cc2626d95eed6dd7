//! Body assembly: expand the per-DM-item, per-sample-item and per-unroll-step
//! fragments bottom-up and splice them into the kernel skeleton.

use dd_core::DedispersionConfig;

use crate::fragments::{fill, fill_offset};

/// The six fragment templates a kernel variant provides. Holes:
/// `<%NUM%>` / `<%OFFSET%>` index the sample items, `<%DM_NUM%>` /
/// `<%DM_OFFSET%>` the DM items, `<%UNROLL%>` the unroll step.
pub(crate) struct BodyTemplates {
    pub def: String,
    pub def_shift: String,
    pub unrolled: String,
    pub shift: String,
    pub sum: String,
    pub store: String,
}

/// Expand the templates for a configuration and fill the skeleton's
/// `<%DEFS%>`, `<%DEFS_SHIFT%>`, `<%UNROLLED_LOOP%>` and `<%STORES%>` holes.
pub(crate) fn assemble(
    skeleton: &str,
    conf: &DedispersionConfig,
    templates: &BodyTemplates,
) -> String {
    let mut defs = String::new();
    let mut defs_shift = String::new();
    let mut stores = String::new();
    let mut unrolled = String::new();

    for dm in 0..conf.items_d1 {
        defs_shift.push_str(&fill(&templates.def_shift, "<%DM_NUM%>", &dm.to_string()));
    }

    for sample in 0..conf.items_d0 {
        let mut defs_dm = String::new();
        let mut stores_dm = String::new();
        for dm in 0..conf.items_d1 {
            defs_dm.push_str(&fill(&templates.def, "<%DM_NUM%>", &dm.to_string()));
            let store = fill(&templates.store, "<%DM_NUM%>", &dm.to_string());
            stores_dm.push_str(&fill_offset(&store, "<%DM_OFFSET%>", dm * conf.threads_d1));
        }
        defs.push_str(&fill(&defs_dm, "<%NUM%>", &sample.to_string()));
        let stores_dm = fill(&stores_dm, "<%NUM%>", &sample.to_string());
        stores.push_str(&fill_offset(
            &stores_dm,
            "<%OFFSET%>",
            sample * conf.threads_d0,
        ));
    }

    for step in 0..conf.unroll {
        let mut body = fill_offset(&templates.unrolled, "<%UNROLL%>", step);

        let mut shifts = String::new();
        for dm in 0..conf.items_d1 {
            let shift = fill(&templates.shift, "<%DM_NUM%>", &dm.to_string());
            let shift = fill_offset(&shift, "<%DM_OFFSET%>", dm * conf.threads_d1);
            shifts.push_str(&fill_offset(&shift, "<%UNROLL%>", step));
        }
        body = fill(&body, "<%SHIFTS%>", &shifts);

        let mut sums = String::new();
        for sample in 0..conf.items_d0 {
            let mut sums_dm = String::new();
            for dm in 0..conf.items_d1 {
                let sum = fill(&templates.sum, "<%DM_NUM%>", &dm.to_string());
                sums_dm.push_str(&fill_offset(&sum, "<%UNROLL%>", step));
            }
            let sums_dm = fill(&sums_dm, "<%NUM%>", &sample.to_string());
            sums.push_str(&fill_offset(&sums_dm, "<%OFFSET%>", sample * conf.threads_d0));
        }
        body = fill(&body, "<%SUMS%>", &sums);

        unrolled.push_str(&body);
    }

    let code = fill(skeleton, "<%DEFS%>", &defs);
    let code = fill(&code, "<%DEFS_SHIFT%>", &defs_shift);
    let code = fill(&code, "<%UNROLLED_LOOP%>", &unrolled);
    fill(&code, "<%STORES%>", &stores)
}

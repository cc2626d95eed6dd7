//! Print the shift table of an observation plan.

use anyhow::Result;
use clap::Parser;

use dd_cli::ObservationArgs;
use dd_dsp::{shifts, shifts_step_two};

#[derive(Parser, Debug)]
#[command(name = "dd-shifts", about = "Print per-channel dispersion delay coefficients")]
struct Cli {
    #[command(flatten)]
    observation: ObservationArgs,

    /// Print the per-subband table of the second subbanding step
    #[arg(long)]
    step_two: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let obs = cli.observation.build()?;

    if cli.step_two {
        let table = shifts_step_two(&obs);
        for (subband, coefficient) in table.iter().enumerate().take(obs.nr_subbands()) {
            println!("{subband} {coefficient:.6}");
        }
    } else {
        let table = shifts(&obs);
        for (channel, coefficient) in table.iter().enumerate().take(obs.nr_channels()) {
            println!("{channel} {coefficient:.6}");
        }
    }
    Ok(())
}

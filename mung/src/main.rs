mod cli_common;
mod run_integrate;
mod run_overlap;

use clap::{Parser, Subcommand};
use log::info;
use run_integrate::*;
use run_overlap::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "MUNG",
    long_about = "Mosaic Unification of Nearest-neighbour Gene panels\n\
		  Integrate single-cell and spatial data sets that measure\n\
		  partially overlapping features. Data files are delimited text\n\
		  (tab or comma, optionally gzipped) with cell names on the header\n\
		  line and feature names in the first column."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Joint embedding, MNN correction and imputation",
        long_about = "Integrate data sets in four stages: \n\
		      (1) Embed every data set on the principal components of\n\
		      each reference, projecting through shared features\n\
		      (2) Rebalance the reference blocks\n\
		      (3) Align data sets by mutual nearest neighbours\n\
		      (4) Impute reference features for query cells.\n"
    )]
    Integrate(IntegrateArgs),

    #[command(
        about = "Count shared features between data sets",
        long_about = "Count the features shared by each pair of data sets.\n\
		      A reference needs at least one partner to be usable."
    )]
    Overlap(OverlapArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Integrate(args) => {
            run_integrate(args)?;
        }
        Commands::Overlap(args) => {
            run_overlap(args)?;
        }
    }

    info!("Done");
    Ok(())
}

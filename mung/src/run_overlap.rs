use crate::cli_common::*;

use clap::Args;
use matrix_util::common_io::write_lines;
use mung::dataset::DatasetSet;
use mung::feature_overlap::FeatureOverlapGraph;

#[derive(Args, Debug)]
pub struct OverlapArgs {
    #[arg(
        short = 'd',
        long = "data",
        value_delimiter(','),
        required = true,
        help = "Data files, `name=file` (comma-separated)"
    )]
    data: Vec<Box<str>>,

    #[arg(
        long,
        short,
        default_value = "stdout",
        help = "Output file",
        long_help = "Tab-separated lines of `first second #shared`.\n\
		     Writes to standard output by default."
    )]
    out: Box<str>,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn run_overlap(args: &OverlapArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let datasets = DatasetSet::new(read_data_args(&args.data)?)?;
    let graph = FeatureOverlapGraph::build(&datasets);
    let names = datasets.names();

    let lines: Vec<Box<str>> = graph
        .sorted_pairs()
        .into_iter()
        .map(|((i, j), shared)| format!("{}\t{}\t{}", names[i], names[j], shared.len()).into())
        .collect();

    write_lines(&lines, &args.out)
}

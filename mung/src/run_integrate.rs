use crate::cli_common::*;

use clap::Args;
use matrix_util::common_io::mkdir;
use mung::common::*;
use mung::dataset::DatasetSet;
use mung::impute::KnnWeighting;
use mung::io::*;
use mung::pipeline::run_integration;
use mung::setting::{IntegrationArgs, IntegrationSetting};

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Args, Debug)]
pub struct IntegrateArgs {
    #[arg(
        short = 'd',
        long = "data",
        value_delimiter(','),
        required = true,
        help = "Data files, `name=file` (comma-separated)",
        long_help = "Feature x cell data files, one per data set.\n\
		     Each item is `name=file`; a bare file name names the\n\
		     data set after the file. Cell names must be unique\n\
		     across all data sets.\n\
		     Example: sce=sce.tsv.gz,spe=spe.tsv.gz"
    )]
    data: Vec<Box<str>>,

    #[arg(
        long,
        value_delimiter(','),
        help = "Spatial coordinate files, `name=file`",
        long_help = "Cell x coordinate files keyed by data set name.\n\
		     Rows are matched to cells by name."
    )]
    coords: Option<Vec<Box<str>>>,

    #[arg(
        short = 'r',
        long = "reference",
        value_delimiter(','),
        help = "Reference data sets (default: all)",
        long_help = "Data sets whose principal components define the\n\
		     embedding blocks. Every data set is a reference if unset."
    )]
    references: Option<Vec<Box<str>>>,

    #[arg(
        long = "datasets",
        value_delimiter(','),
        help = "Integrate only these data sets",
        long_help = "Restrict the run to a subset of the data sets,\n\
		     in the given order."
    )]
    datasets: Option<Vec<Box<str>>>,

    #[arg(
        long,
        default_value_t = false,
        help = "Use only the features shared by all data sets",
        long_help = "Cut every matrix down to the features measured in\n\
		     all data sets before embedding (intersection baseline)."
    )]
    shared_only: bool,

    #[arg(
        long,
        default_value_t = DEFAULT_RANK,
        help = "Principal components per reference"
    )]
    rank: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_KNN,
        help = "Number of nearest neighbours",
        long_help = "Number of nearest neighbours for both the MNN\n\
		     correction and the imputation."
    )]
    knn: usize,

    #[arg(
        long,
        value_delimiter(','),
        help = "Reference block weights, `name=w`",
        long_help = "Relative weights of the reference blocks.\n\
		     Unnamed references get weight 1. Without weights every\n\
		     block is scaled to the same total.\n\
		     Example: sce=1,spe=2"
    )]
    weights: Option<Vec<Box<str>>>,

    #[arg(
        long,
        value_delimiter(','),
        help = "MNN order, anchor first (default: references)"
    )]
    anchor_order: Option<Vec<Box<str>>>,

    #[arg(
        long,
        default_value_t = DEFAULT_MIN_MNN_PAIRS,
        help = "Fewest MNN pairs accepted per data set"
    )]
    min_pairs: usize,

    #[arg(
        long,
        help = "Gaussian kernel bandwidth of the MNN correction",
        long_help = "Gaussian kernel bandwidth for smoothing MNN\n\
		     corrections. Defaults to the median distance from\n\
		     query cells to their nearest anchor cell."
    )]
    sigma: Option<f32>,

    #[arg(
        long,
        value_delimiter(','),
        help = "Imputation directions, `reference:query`",
        long_help = "Impute the features of `reference` for the cells\n\
		     of `query`, for each pair.\n\
		     Example: sce:spe"
    )]
    impute: Option<Vec<Box<str>>>,

    #[arg(
        long,
        value_enum,
        default_value = "uniform",
        help = "Neighbour weighting in imputation"
    )]
    weighting: KnnWeighting,

    #[arg(
        long,
        help = "Randomly keep at most this many cells per data set"
    )]
    max_cells: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_SEED, help = "Random seed")]
    seed: u64,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header:\n\
		     `{out}.embedding.tsv.gz` before correction\n\
		     `{out}.corrected.tsv.gz` after correction\n\
		     `{out}.imputed_{ref}_to_{query}.tsv.gz`\n\
		     `{out}.summary.json`"
    )]
    out: Box<str>,

    #[arg(
        long,
        short,
        help = "Verbosity",
        long_help = "Enable verbose output.\n\
		     Prints additional information during execution."
    )]
    verbose: bool,
}

pub fn run_integrate(args: &IntegrateArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut data_vec = read_data_args(&args.data)?;

    if let Some(coords) = args.coords.as_ref() {
        for item in coords {
            let (name, file) = split_pair(item, '=')?;
            let pos = data_vec
                .iter()
                .position(|x| x.name() == name.as_ref())
                .ok_or_else(|| MungError::invalid(format!("no data set named '{}'", name)))?;
            let x = data_vec.remove(pos);
            data_vec.insert(pos, attach_coordinates(x, &file)?);
        }
    }

    if let Some(ncells) = args.max_cells {
        data_vec = data_vec
            .iter()
            .map(|x| x.subsample_cells(ncells, &mut rng))
            .collect::<anyhow::Result<Vec<_>>>()?;
    }

    let datasets = DatasetSet::new(data_vec)?;

    let integration_args = IntegrationArgs {
        setting: parse_setting(args, &datasets),
        rank: args.rank,
        reweight: parse_weights(args.weights.as_deref())?,
        knn: args.knn,
        anchor_order: args.anchor_order.clone(),
        min_mnn_pairs: args.min_pairs,
        kernel_sigma: args.sigma,
        weighting: args.weighting,
        impute: args
            .impute
            .iter()
            .flatten()
            .map(|x| split_pair(x, ':'))
            .collect::<anyhow::Result<Vec<_>>>()?,
    };

    let out = run_integration(&datasets, &integration_args, &mut rng)?;

    mkdir(&args.out)?;
    write_embedding(&out.reweighted, &format!("{}.embedding.tsv.gz", args.out))?;
    write_embedding(&out.corrected, &format!("{}.corrected.tsv.gz", args.out))?;
    for imputed in out.imputed.iter() {
        let file = format!(
            "{}.imputed_{}_to_{}.tsv.gz",
            args.out, imputed.reference, imputed.query
        );
        write_imputed(imputed, &file)?;
    }
    write_summary(&out.summary(), &format!("{}.summary.json", args.out))?;

    Ok(())
}

fn parse_setting(args: &IntegrateArgs, datasets: &DatasetSet) -> IntegrationSetting {
    let references = args.references.clone().unwrap_or_else(|| datasets.names());

    if args.shared_only {
        return IntegrationSetting::SharedFeaturesOnly { references };
    }

    match (args.datasets.as_ref(), args.references.as_ref()) {
        (Some(names), _) => IntegrationSetting::Custom {
            datasets: names.clone(),
            references: args.references.clone().unwrap_or_else(|| names.clone()),
        },
        (None, Some(refs)) if refs.len() == 1 => IntegrationSetting::ReferenceOnly {
            reference: refs[0].clone(),
        },
        (None, Some(refs)) => IntegrationSetting::Custom {
            datasets: datasets.names(),
            references: refs.clone(),
        },
        (None, None) => IntegrationSetting::AllReferences,
    }
}

fn parse_weights(items: Option<&[Box<str>]>) -> anyhow::Result<Option<Vec<(Box<str>, f32)>>> {
    let Some(items) = items else {
        return Ok(None);
    };
    items
        .iter()
        .map(|x| -> anyhow::Result<(Box<str>, f32)> {
            let (name, w) = split_pair(x, '=')?;
            let w = w
                .parse::<f32>()
                .map_err(|_| MungError::invalid(format!("weight '{}' is not a number", w)))?;
            Ok((name, w))
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map(Some)
}

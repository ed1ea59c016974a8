use crate::common::*;
use crate::dataset::DatasetSet;
use crate::embedding::JointEmbedding;
use crate::impute::{impute_features, ImputationResult, ImputeArgs};
use crate::mnn_correct::{mnn_correct, MnnArgs, MnnStep};
use crate::reweight::{block_totals, reweight_embedding};
use crate::setting::IntegrationArgs;
use crate::stabilized_embed::stabilized_embedding;

use rand::Rng;
use serde::Serialize;

pub struct IntegrationOut {
    /// datasets as used after resolving the setting
    pub datasets: DatasetSet,
    pub references: Vec<Box<str>>,
    pub embedding: JointEmbedding,
    pub reweighted: JointEmbedding,
    pub corrected: JointEmbedding,
    pub mnn_steps: Vec<MnnStep>,
    pub imputed: Vec<ImputationResult>,
}

/// Embed, reweight, correct and impute, in that order
///
/// All names in `args` are checked before any computation. Imputed
/// values come from the datasets as given, so a setting that drops
/// features for the embedding still imputes the full feature set.
pub fn run_integration<R: Rng>(
    datasets: &DatasetSet,
    args: &IntegrationArgs,
    rng: &mut R,
) -> anyhow::Result<IntegrationOut> {
    if args.knn == 0 {
        return Err(MungError::invalid("k must be positive").into());
    }
    if args.rank == 0 {
        return Err(MungError::invalid("rank must be positive").into());
    }

    let (resolved, references) = args.setting.resolve(datasets)?;
    let anchor_order = args.anchor_order.clone().unwrap_or_else(|| references.clone());
    check_names(&resolved, &references, args, &anchor_order)?;

    info!(
        "integrating {} datasets ({} cells) on {} reference(s)",
        resolved.len(),
        resolved.num_cells(),
        references.len()
    );

    let embedding = stabilized_embedding(&resolved, &references, args.rank, rng)?;
    let reweighted = reweight_embedding(&embedding, args.reweight.as_deref())?;

    let mnn_args = MnnArgs {
        knn: args.knn,
        min_pairs: args.min_mnn_pairs,
        sigma: args.kernel_sigma,
    };
    let mnn = mnn_correct(&reweighted, &resolved, &anchor_order, &mnn_args)?;

    let imputed = args
        .impute
        .iter()
        .map(|(r, q)| {
            let impute_args = ImputeArgs {
                knn: args.knn,
                weighting: args.weighting,
                ..ImputeArgs::new(r, q)
            };
            impute_features(datasets, &mnn.corrected, &impute_args)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(IntegrationOut {
        datasets: resolved,
        references,
        embedding,
        reweighted,
        corrected: mnn.corrected,
        mnn_steps: mnn.steps,
        imputed,
    })
}

fn check_names(
    resolved: &DatasetSet,
    references: &[Box<str>],
    args: &IntegrationArgs,
    anchor_order: &[Box<str>],
) -> anyhow::Result<()> {
    if references.is_empty() {
        return Err(MungError::invalid("at least one reference dataset is required").into());
    }
    if let Some(weights) = args.reweight.as_ref() {
        if let Some((name, _)) = weights.iter().find(|(n, _)| !references.contains(n)) {
            return Err(
                MungError::invalid(format!("weight given for non-reference '{}'", name)).into(),
            );
        }
    }
    if anchor_order.is_empty() {
        return Err(MungError::invalid("the MNN anchor order is empty").into());
    }
    for name in anchor_order {
        resolved.require(name)?;
    }
    for (r, q) in args.impute.iter() {
        let reference = resolved.require(r)?;
        resolved.require(q)?;
        if args.knn > reference.num_cells() {
            return Err(MungError::EmptyNeighborhood {
                reference: r.clone(),
                knn: args.knn,
                available: reference.num_cells(),
            }
            .into());
        }
    }
    Ok(())
}

#[derive(Serialize)]
pub struct DatasetSummary {
    pub name: Box<str>,
    pub features: usize,
    pub cells: usize,
}

#[derive(Serialize)]
pub struct BlockSummary {
    pub reference: Box<str>,
    pub start: usize,
    pub width: usize,
    pub total_before: f32,
    pub total_after: f32,
}

#[derive(Serialize)]
pub struct MnnSummary {
    pub dataset: Box<str>,
    pub pairs: usize,
    pub paired_cells: usize,
    pub sigma: f32,
}

#[derive(Serialize)]
pub struct ImputeSummary {
    pub reference: Box<str>,
    pub query: Box<str>,
    pub features: usize,
    pub cells: usize,
}

/// What a run produced, for `{out}.summary.json`
#[derive(Serialize)]
pub struct IntegrationSummary {
    pub datasets: Vec<DatasetSummary>,
    pub references: Vec<Box<str>>,
    pub embedding_shape: (usize, usize),
    pub blocks: Vec<BlockSummary>,
    pub mnn: Vec<MnnSummary>,
    pub imputed: Vec<ImputeSummary>,
}

impl IntegrationOut {
    pub fn summary(&self) -> IntegrationSummary {
        let before = block_totals(&self.embedding);
        let after = block_totals(&self.reweighted);

        IntegrationSummary {
            datasets: self
                .datasets
                .iter()
                .map(|x| DatasetSummary {
                    name: x.name().into(),
                    features: x.num_features(),
                    cells: x.num_cells(),
                })
                .collect(),
            references: self.references.clone(),
            embedding_shape: self.corrected.data().shape(),
            blocks: self
                .embedding
                .blocks()
                .iter()
                .zip(before.into_iter().zip(after))
                .map(|(b, (t0, t1))| BlockSummary {
                    reference: b.name.clone(),
                    start: b.start,
                    width: b.width,
                    total_before: t0,
                    total_after: t1,
                })
                .collect(),
            mnn: self
                .mnn_steps
                .iter()
                .map(|s| MnnSummary {
                    dataset: s.dataset.clone(),
                    pairs: s.num_pairs,
                    paired_cells: s.num_paired_cells,
                    sigma: s.sigma,
                })
                .collect(),
            imputed: self
                .imputed
                .iter()
                .map(|x| ImputeSummary {
                    reference: x.reference.clone(),
                    query: x.query.clone(),
                    features: x.data.nrows(),
                    cells: x.data.ncols(),
                })
                .collect(),
        }
    }
}

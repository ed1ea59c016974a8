use crate::common::*;
use crate::dataset::DatasetSet;
use crate::embedding::JointEmbedding;
use crate::feature_overlap::FeatureOverlapGraph;

use matrix_util::dmatrix_rsvd::RSVD;
use matrix_util::dmatrix_util::concatenate_vertical;
use matrix_util::traits::MatOps;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Joint embedding of datasets that measure overlapping, but not
/// identical, features.
///
/// For each reference dataset we take the top `rank` principal
/// components of its (feature-centred) matrix. Every other dataset is
/// then reached by a breadth-first walk over the feature overlap
/// graph: a least-squares map from the parent's shared features to
/// the parent's scores is fitted on the parent's cells and applied to
/// the child's cells. Walks through intermediate datasets chain these
/// maps, so a dataset only needs an indirect feature path to a
/// reference.
///
/// Blocks are computed independently per reference and placed side by
/// side in the order of `references`. Rows follow the cell order of
/// `datasets`.
///
/// * `datasets` - all datasets of the run
/// * `references` - datasets whose components define the blocks
/// * `rank` - number of components per reference
/// * `rng` - seeds the randomized decomposition
pub fn stabilized_embedding<R: Rng>(
    datasets: &DatasetSet,
    references: &[Box<str>],
    rank: usize,
    rng: &mut R,
) -> anyhow::Result<JointEmbedding> {
    check_references(datasets, references, rank)?;

    let graph = FeatureOverlapGraph::build(datasets);
    graph.check_references(references)?;

    // one seed per reference, drawn up front, so the parallel jobs
    // don't depend on scheduling
    let seeds: Vec<u64> = references.iter().map(|_| rng.random::<u64>()).collect();

    let blocks = references
        .par_iter()
        .zip(seeds.into_par_iter())
        .map(|(r, seed)| -> anyhow::Result<(Box<str>, Mat)> {
            let mut block_rng = StdRng::seed_from_u64(seed);
            let block = embed_on_reference(datasets, &graph, r, rank, &mut block_rng)?;
            Ok((r.clone(), block))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let ret = JointEmbedding::from_blocks(datasets.cell_names(), blocks)?;

    info!(
        "stabilized embedding: {} cells x {} dimensions ({} reference block(s))",
        ret.num_cells(),
        ret.num_dims(),
        ret.blocks().len()
    );
    Ok(ret)
}

fn check_references(
    datasets: &DatasetSet,
    references: &[Box<str>],
    rank: usize,
) -> anyhow::Result<()> {
    if references.is_empty() {
        return Err(MungError::invalid("at least one reference dataset is required").into());
    }
    if rank == 0 {
        return Err(MungError::invalid("embedding rank must be positive").into());
    }

    let mut seen = HashSet::default();
    for r in references {
        if !seen.insert(r.clone()) {
            return Err(MungError::invalid(format!("reference '{}' listed twice", r)).into());
        }
        let x = datasets.require(r)?;
        let max_rank = x.num_features().min(x.num_cells());
        if rank > max_rank {
            return Err(MungError::invalid(format!(
                "rank {} exceeds what reference '{}' supports ({} features, {} cells)",
                rank,
                r,
                x.num_features(),
                x.num_cells()
            ))
            .into());
        }
    }
    Ok(())
}

/// One reference block: cells of all datasets x `rank`
fn embed_on_reference(
    datasets: &DatasetSet,
    graph: &FeatureOverlapGraph,
    reference: &str,
    rank: usize,
    rng: &mut StdRng,
) -> anyhow::Result<Mat> {
    let root = datasets
        .index_of(reference)
        .ok_or_else(|| MungError::invalid(format!("unknown dataset '{}'", reference)))?;

    let tree = graph.path_tree(root);

    if let Some(d) = (0..datasets.len()).find(|&d| !tree.is_reachable(d)) {
        return Err(MungError::UnreachableReference {
            dataset: datasets.at(d).name().into(),
            reference: reference.into(),
        }
        .into());
    }

    let mut xx_dn = datasets.at(root).data().clone();
    xx_dn.centre_rows_inplace();
    let (_, dd, vv) = xx_dn.rsvd(rank, rng)?;

    // n x k scores of the reference cells
    let mut scores: Vec<Option<Mat>> = vec![None; datasets.len()];
    scores[root] = Some(vv * Mat::from_diagonal(&dd));

    info!(
        "[{}] top {} singular values: {:?}",
        reference,
        dd.len(),
        dd.iter().take(5).collect::<Vec<_>>()
    );

    for &d in tree.order.iter() {
        let p = tree.parent[d].ok_or_else(|| anyhow::anyhow!("broken path tree"))?;
        let features = graph.shared_by_index(p, d);
        let parent = datasets.at(p);
        let child = datasets.at(d);

        let parent_scores = scores[p]
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("'{}' visited before its parent", child.name()))?;

        let xx_parent = parent.select_features(features)?.transpose();
        let xx_child = child.select_features(features)?.transpose();

        let map = LinearMap::fit(&xx_parent, parent_scores)?;
        scores[d] = Some(map.predict(&xx_child));

        debug!(
            "[{}] projected '{}' from '{}' through {} features",
            reference,
            child.name(),
            parent.name(),
            features.len()
        );
    }

    let scores = scores
        .into_iter()
        .enumerate()
        .map(|(d, s)| {
            s.ok_or_else(|| {
                MungError::UnreachableReference {
                    dataset: datasets.at(d).name().into(),
                    reference: reference.into(),
                }
                .into()
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    concatenate_vertical(&scores)
}

/// `y ≈ (x - mean_x) * coef + mean_y`, a least-squares fit with an
/// intercept; the minimum-norm solution when `x` is rank deficient
struct LinearMap {
    mean_x: nalgebra::RowDVector<f32>,
    mean_y: nalgebra::RowDVector<f32>,
    coef: Mat,
}

impl LinearMap {
    /// * `xx` - n x p predictors
    /// * `yy` - n x k responses
    fn fit(xx: &Mat, yy: &Mat) -> anyhow::Result<Self> {
        if xx.nrows() != yy.nrows() {
            return Err(anyhow::anyhow!(
                "{} predictor rows vs. {} response rows",
                xx.nrows(),
                yy.nrows()
            ));
        }
        if xx.nrows() == 0 {
            return Err(anyhow::anyhow!("no cells to fit the projection"));
        }

        let mut xx_c = xx.clone();
        let mean_x = xx_c.centre_columns_inplace().transpose();
        let mut yy_c = yy.clone();
        let mean_y = yy_c.centre_columns_inplace().transpose();

        let svd = xx_c.svd(true, true);
        let (uu, vt) = match (svd.u, svd.v_t) {
            (Some(uu), Some(vt)) => (uu, vt),
            _ => anyhow::bail!("SVD failed in the least-squares projection"),
        };
        let dd = svd.singular_values;

        let dmax = dd.iter().cloned().fold(0_f32, f32::max);
        let tol = dmax * (xx.nrows().max(xx.ncols()) as f32) * f32::EPSILON;
        let dinv = dd.map(|d| if d > tol { 1.0 / d } else { 0.0 });

        // coef = V diag(1/d) U' Yc
        let coef = vt.transpose() * Mat::from_diagonal(&dinv) * (uu.transpose() * yy_c);

        Ok(Self {
            mean_x,
            mean_y,
            coef,
        })
    }

    fn predict(&self, xx: &Mat) -> Mat {
        let mut xx_c = xx.clone();
        for mut r in xx_c.row_iter_mut() {
            r -= &self.mean_x;
        }
        let mut ret = xx_c * &self.coef;
        for mut r in ret.row_iter_mut() {
            r += &self.mean_y;
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use approx::assert_abs_diff_eq;
    use matrix_util::traits::SampleOps;

    fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("{}{}", prefix, i).into()).collect()
    }

    fn refs(xs: &[&str]) -> Vec<Box<str>> {
        xs.iter().map(|&x| x.into()).collect()
    }

    fn kind(err: &anyhow::Error) -> Option<&MungError> {
        err.downcast_ref::<MungError>()
    }

    #[test]
    fn linear_map_recovers_exact_relation() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(1);
        let xx = Mat::rnorm(30, 3, &mut rng);
        let beta = Mat::from_row_slice(3, 2, &[1.0, -2.0, 0.5, 0.0, 3.0, 1.0]);
        let yy = (&xx * &beta).add_scalar(4.0);

        let map = LinearMap::fit(&xx, &yy)?;
        assert_abs_diff_eq!(map.coef, beta, epsilon = 1e-3);
        assert_abs_diff_eq!(map.predict(&xx), yy, epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn two_references_shape() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(2);
        let a = Dataset::new(
            "A",
            Mat::rnorm(4, 3, &mut rng),
            refs(&["g1", "g2", "g3", "g4"]),
            names("a", 3),
        )?;
        let b = Dataset::new(
            "B",
            Mat::rnorm(3, 3, &mut rng),
            refs(&["g3", "g4", "h1"]),
            names("b", 3),
        )?;
        let set = DatasetSet::new(vec![a, b])?;

        let emb = stabilized_embedding(&set, &refs(&["A", "B"]), 2, &mut rng)?;
        assert_eq!(emb.data().shape(), (6, 4));
        assert!(emb.data().iter().all(|x| x.is_finite()));
        assert_eq!(emb.block("B").unwrap().range(), 2..4);
        Ok(())
    }

    #[test]
    fn query_with_all_reference_features_lands_on_reference_scores() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let xx = Mat::rnorm(5, 12, &mut rng);
        let r = Dataset::new("ref", xx.clone(), names("g", 5), names("r", 12))?;
        let q = Dataset::new("query", xx, names("g", 5), names("q", 12))?;
        let set = DatasetSet::new(vec![r, q])?;

        let emb = stabilized_embedding(&set, &refs(&["ref"]), 2, &mut rng)?;
        let zz = emb.data();
        for i in 0..12 {
            for k in 0..2 {
                assert_abs_diff_eq!(zz[(i, k)], zz[(i + 12, k)], epsilon = 1e-3);
            }
        }
        Ok(())
    }

    #[test]
    fn indirect_path_reaches_reference() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(4);
        let a = Dataset::new("a", Mat::rnorm(3, 6, &mut rng), refs(&["g1", "g2", "g3"]), names("a", 6))?;
        let b = Dataset::new("b", Mat::rnorm(3, 6, &mut rng), refs(&["g2", "g3", "g4"]), names("b", 6))?;
        let c = Dataset::new("c", Mat::rnorm(2, 4, &mut rng), refs(&["g4", "g5"]), names("c", 4))?;
        let set = DatasetSet::new(vec![a, b, c])?;

        let emb = stabilized_embedding(&set, &refs(&["a"]), 2, &mut rng)?;
        assert_eq!(emb.data().shape(), (16, 2));
        assert!(emb.data().iter().all(|x| x.is_finite()));
        Ok(())
    }

    #[test]
    fn unreachable_dataset_is_an_error() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(5);
        let a = Dataset::new("a", Mat::rnorm(2, 4, &mut rng), refs(&["g1", "g2"]), names("a", 4))?;
        let b = Dataset::new("b", Mat::rnorm(2, 4, &mut rng), refs(&["g2", "g3"]), names("b", 4))?;
        let c = Dataset::new("c", Mat::rnorm(2, 4, &mut rng), refs(&["h1", "h2"]), names("c", 4))?;
        let set = DatasetSet::new(vec![a, b, c])?;

        let err = stabilized_embedding(&set, &refs(&["a"]), 1, &mut rng).unwrap_err();
        assert_eq!(
            kind(&err),
            Some(&MungError::UnreachableReference {
                dataset: "c".into(),
                reference: "a".into()
            })
        );
        Ok(())
    }

    #[test]
    fn invalid_rank_and_references() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(6);
        let a = Dataset::new("a", Mat::rnorm(2, 4, &mut rng), refs(&["g1", "g2"]), names("a", 4))?;
        let set = DatasetSet::new(vec![a])?;

        for (r, k) in [(refs(&[]), 1), (refs(&["a"]), 0), (refs(&["a"]), 3), (refs(&["zz"]), 1)] {
            let err = stabilized_embedding(&set, &r, k, &mut rng).unwrap_err();
            assert!(matches!(kind(&err), Some(MungError::InvalidConfiguration(_))));
        }

        // a lone reference is just its own decomposition
        let emb = stabilized_embedding(&set, &refs(&["a"]), 2, &mut rng)?;
        assert_eq!(emb.data().shape(), (4, 2));
        Ok(())
    }

    #[test]
    fn same_seed_same_embedding() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Dataset::new("a", Mat::rnorm(40, 30, &mut rng), names("g", 40), names("a", 30))?;
        let b = Dataset::new("b", Mat::rnorm(10, 20, &mut rng), names("g", 10), names("b", 20))?;
        let set = DatasetSet::new(vec![a, b])?;

        let e1 = stabilized_embedding(&set, &refs(&["a", "b"]), 3, &mut StdRng::seed_from_u64(8))?;
        let e2 = stabilized_embedding(&set, &refs(&["a", "b"]), 3, &mut StdRng::seed_from_u64(8))?;
        assert_eq!(e1.data(), e2.data());
        Ok(())
    }
}

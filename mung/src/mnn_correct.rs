use crate::common::*;
use crate::dataset::DatasetSet;
use crate::embedding::JointEmbedding;

use indicatif::ParallelProgressIterator;
use matrix_util::knn_match::{ColumnDict, MakeVecPoint};
use nalgebra::RowDVector;
use rayon::prelude::*;

pub struct MnnArgs {
    /// neighbours searched in each direction
    pub knn: usize,
    /// fewest mutual pairs accepted for a dataset
    pub min_pairs: usize,
    /// Gaussian kernel bandwidth; the median query-to-anchor
    /// nearest-neighbour distance if unset
    pub sigma: Option<f32>,
}

impl Default for MnnArgs {
    fn default() -> Self {
        Self {
            knn: DEFAULT_KNN,
            min_pairs: DEFAULT_MIN_MNN_PAIRS,
            sigma: None,
        }
    }
}

/// What happened to one corrected dataset
#[derive(Clone, Debug)]
pub struct MnnStep {
    pub dataset: Box<str>,
    pub num_pairs: usize,
    pub num_paired_cells: usize,
    pub sigma: f32,
}

#[derive(Debug)]
pub struct MnnOut {
    pub corrected: JointEmbedding,
    pub steps: Vec<MnnStep>,
}

/// Mutual nearest neighbour batch correction of a joint embedding
///
/// The first dataset in `order` is the anchor set and keeps its
/// coordinates. Each following dataset is moved toward the anchor set
/// by a smoothed average of the displacements of its mutual nearest
/// neighbour pairs, and then joins the anchor set. Cells of datasets
/// not in `order` are left as they are.
///
/// * `embedding` - cells of all `datasets`
/// * `datasets` - defines which cells belong to which dataset
/// * `order` - dataset names, anchor first
pub fn mnn_correct(
    embedding: &JointEmbedding,
    datasets: &DatasetSet,
    order: &[Box<str>],
    args: &MnnArgs,
) -> anyhow::Result<MnnOut> {
    check_args(datasets, order, args)?;

    let rows_per_dataset = order
        .iter()
        .map(|name| embedding.rows_of(datasets.require(name)?.column_names()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut data = embedding.data().clone();
    let mut anchor_rows = rows_per_dataset[0].clone();
    let mut steps = vec![];

    info!("MNN anchor: '{}' ({} cells)", order[0], anchor_rows.len());

    for (name, query_rows) in order.iter().zip(rows_per_dataset.iter()).skip(1) {
        if query_rows.is_empty() {
            continue;
        }
        let step = correct_toward_anchor(&mut data, &anchor_rows, query_rows, name, args)?;
        info!(
            "MNN '{}': {} pairs over {} cells, sigma = {}",
            step.dataset, step.num_pairs, step.num_paired_cells, step.sigma
        );
        steps.push(step);
        anchor_rows.extend(query_rows.iter().copied());
    }

    Ok(MnnOut {
        corrected: embedding.with_data(data)?,
        steps,
    })
}

fn check_args(datasets: &DatasetSet, order: &[Box<str>], args: &MnnArgs) -> anyhow::Result<()> {
    if order.is_empty() {
        return Err(MungError::invalid("the MNN anchor order is empty").into());
    }
    let mut seen = HashSet::default();
    for name in order {
        datasets.require(name)?;
        if !seen.insert(name.clone()) {
            return Err(
                MungError::invalid(format!("'{}' appears twice in the anchor order", name)).into(),
            );
        }
    }
    if args.knn == 0 {
        return Err(MungError::invalid("MNN requires at least one neighbour").into());
    }
    if args.min_pairs == 0 {
        return Err(MungError::invalid("MNN requires at least one pair").into());
    }
    if let Some(sigma) = args.sigma {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(MungError::invalid(format!("invalid kernel bandwidth {}", sigma)).into());
        }
    }
    Ok(())
}

fn correct_toward_anchor(
    data: &mut Mat,
    anchor_rows: &[usize],
    query_rows: &[usize],
    name: &str,
    args: &MnnArgs,
) -> anyhow::Result<MnnStep> {
    let knn = args.knn.min(anchor_rows.len()).min(query_rows.len());

    let anchor_dict = ColumnDict::from_matrix_rows(data, anchor_rows, anchor_rows.to_vec());
    let query_dict = ColumnDict::from_matrix_rows(data, query_rows, query_rows.to_vec());

    let query_to_anchor: Vec<(Vec<usize>, Vec<f32>)> = query_rows
        .par_iter()
        .progress_count(query_rows.len() as u64)
        .map(|&q| anchor_dict.search_by_query_data(&data.row(q).to_vp(), knn))
        .collect();

    let anchor_to_query: HashMap<usize, HashSet<usize>> = anchor_rows
        .par_iter()
        .map(|&a| {
            let (nn, _) = query_dict.search_by_query_data(&data.row(a).to_vp(), knn);
            (a, nn.into_iter().collect::<HashSet<_>>())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect();

    // (anchor, query) pairs, query-major
    let pairs: Vec<(usize, usize)> = query_rows
        .iter()
        .zip(query_to_anchor.iter())
        .flat_map(|(&q, (nn, _))| {
            nn.iter()
                .filter(|&&a| anchor_to_query.get(&a).is_some_and(|s| s.contains(&q)))
                .map(move |&a| (a, q))
                .collect::<Vec<_>>()
        })
        .collect();

    if pairs.len() < args.min_pairs {
        return Err(MungError::InsufficientMatches {
            dataset: name.into(),
            found: pairs.len(),
            required: args.min_pairs,
        }
        .into());
    }

    // average displacement of every paired query cell
    let mut paired_cells: Vec<usize> = vec![];
    let mut cell2pos: HashMap<usize, usize> = HashMap::default();
    let mut sums: Vec<RowDVector<f32>> = vec![];
    let mut counts: Vec<f32> = vec![];
    for &(a, q) in pairs.iter() {
        let delta = data.row(a) - data.row(q);
        let pos = *cell2pos.entry(q).or_insert_with(|| {
            paired_cells.push(q);
            sums.push(RowDVector::zeros(delta.len()));
            counts.push(0.0);
            sums.len() - 1
        });
        sums[pos] += &delta;
        counts[pos] += 1.0;
    }
    let corrections: Vec<RowDVector<f32>> = sums
        .into_iter()
        .zip(counts)
        .map(|(s, n)| s / n)
        .collect();

    let sigma = match args.sigma {
        Some(sigma) => sigma,
        None => median_nearest_distance(&query_to_anchor).max(f32::EPSILON),
    };
    let denom = 2.0 * sigma * sigma;

    let mut mean_correction = RowDVector::<f32>::zeros(data.ncols());
    for c in corrections.iter() {
        mean_correction += c;
    }
    mean_correction /= corrections.len() as f32;

    let shifted: Vec<RowDVector<f32>> = query_rows
        .par_iter()
        .map(|&q| {
            let x = data.row(q).into_owned();
            let mut acc = RowDVector::<f32>::zeros(x.len());
            let mut tot = 0_f32;
            for (&p, c) in paired_cells.iter().zip(corrections.iter()) {
                let d2 = (data.row(p) - &x).norm_squared();
                let w = (-d2 / denom).exp();
                acc += c * w;
                tot += w;
            }
            let delta = if tot > 0.0 && tot.is_finite() {
                acc / tot
            } else {
                mean_correction.clone()
            };
            x + delta
        })
        .collect();

    for (&q, x) in query_rows.iter().zip(shifted) {
        data.set_row(q, &x);
    }

    Ok(MnnStep {
        dataset: name.into(),
        num_pairs: pairs.len(),
        num_paired_cells: paired_cells.len(),
        sigma,
    })
}

fn median_nearest_distance(hits: &[(Vec<usize>, Vec<f32>)]) -> f32 {
    let mut dd: Vec<f32> = hits
        .iter()
        .filter_map(|(_, d)| d.first().copied())
        .collect();
    if dd.is_empty() {
        return 0.0;
    }
    dd.sort_by(|a, b| a.total_cmp(b));
    let n = dd.len();
    if n % 2 == 1 {
        dd[n / 2]
    } else {
        0.5 * (dd[n / 2 - 1] + dd[n / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use approx::assert_abs_diff_eq;

    fn cells(prefix: &str, n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("{}{}", prefix, i).into()).collect()
    }

    fn toy_set(sizes: &[(&str, usize)]) -> DatasetSet {
        DatasetSet::new(
            sizes
                .iter()
                .map(|&(name, n)| {
                    Dataset::new(name, Mat::zeros(1, n), vec!["g".into()], cells(name, n)).unwrap()
                })
                .collect(),
        )
        .unwrap()
    }

    /// points on a 4 x 4 grid with unit spacing, shifted per dataset
    fn grid_embedding(shifts: &[(f32, f32)]) -> (JointEmbedding, Vec<Box<str>>) {
        let n = 16;
        let mut names = vec![];
        let mut rows = vec![];
        for (d, &(dx, dy)) in shifts.iter().enumerate() {
            let prefix = format!("d{}_", d);
            for i in 0..n {
                rows.push([(i % 4) as f32 + dx, (i / 4) as f32 + dy]);
            }
            names.extend(cells(&prefix, n));
        }
        let data = Mat::from_fn(rows.len(), 2, |i, j| rows[i][j]);
        let emb = JointEmbedding::from_blocks(names.clone(), vec![("d0_".into(), data)]).unwrap();
        (emb, names)
    }

    #[test]
    fn constant_shift_is_removed() -> anyhow::Result<()> {
        let (emb, _) = grid_embedding(&[(0.0, 0.0), (0.2, -0.1)]);
        let set = toy_set(&[("d0_", 16), ("d1_", 16)]);
        let args = MnnArgs {
            knn: 1,
            ..Default::default()
        };

        let out = mnn_correct(&emb, &set, &["d0_".into(), "d1_".into()], &args)?;
        let zz = out.corrected.data();

        // anchor untouched
        assert_eq!(zz.rows(0, 16), emb.data().rows(0, 16));
        // query lands on the anchor
        assert_abs_diff_eq!(zz.rows(16, 16), emb.data().rows(0, 16), epsilon = 1e-4);
        assert_eq!(out.steps[0].num_pairs, 16);
        Ok(())
    }

    #[test]
    fn later_datasets_use_the_grown_anchor_set() -> anyhow::Result<()> {
        let (emb, _) = grid_embedding(&[(0.0, 0.0), (0.1, 0.1), (-0.2, 0.0)]);
        let set = toy_set(&[("d0_", 16), ("d1_", 16), ("d2_", 16)]);

        // d1 is not in the order and stays put
        let out = mnn_correct(&emb, &set, &["d2_".into(), "d0_".into()], &MnnArgs::default())?;
        let zz = out.corrected.data();

        assert_eq!(zz.rows(32, 16), emb.data().rows(32, 16));
        assert_eq!(zz.rows(16, 16), emb.data().rows(16, 16));
        assert_eq!(out.steps.len(), 1);
        assert_eq!(out.steps[0].dataset.as_ref(), "d0_");
        Ok(())
    }

    #[test]
    fn too_few_pairs() {
        let (emb, _) = grid_embedding(&[(0.0, 0.0), (0.5, 0.5)]);
        let set = toy_set(&[("d0_", 16), ("d1_", 16)]);
        let args = MnnArgs {
            knn: 1,
            min_pairs: 100,
            sigma: None,
        };
        let err = mnn_correct(&emb, &set, &["d0_".into(), "d1_".into()], &args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MungError>(),
            Some(MungError::InsufficientMatches { required: 100, .. })
        ));
    }

    #[test]
    fn invalid_orders() {
        let (emb, _) = grid_embedding(&[(0.0, 0.0), (0.5, 0.5)]);
        let set = toy_set(&[("d0_", 16), ("d1_", 16)]);
        for order in [
            vec![],
            vec!["zz".into()],
            vec!["d0_".into(), "d0_".into()],
        ] {
            let err = mnn_correct(&emb, &set, &order, &MnnArgs::default()).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MungError>(),
                Some(MungError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn median_of_first_distances() {
        let hits = vec![
            (vec![0], vec![3.0, 9.0]),
            (vec![1], vec![1.0]),
            (vec![2], vec![2.0]),
            (vec![3], vec![4.0]),
        ];
        assert_abs_diff_eq!(median_nearest_distance(&hits), 2.5);
    }
}

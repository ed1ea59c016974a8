use crate::common::*;
use crate::dataset::{Dataset, DatasetSet};
use crate::embedding::JointEmbedding;

use indicatif::ParallelProgressIterator;
use matrix_util::knn_match::{ColumnDict, MakeVecPoint};
use rayon::prelude::*;

/// How neighbours contribute to an imputed value
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KnnWeighting {
    /// each of the `k` neighbours counts `1/k`
    #[default]
    Uniform,
    /// softmax of negative distances
    Distance,
}

pub struct ImputeArgs {
    /// dataset whose features are imputed
    pub reference: Box<str>,
    /// dataset the query cells come from
    pub query: Box<str>,
    /// reference cells to borrow from (all cells of `reference` if unset)
    pub reference_cells: Option<Vec<Box<str>>>,
    /// cells to impute (all cells of `query` if unset)
    pub query_cells: Option<Vec<Box<str>>>,
    pub knn: usize,
    pub weighting: KnnWeighting,
}

impl ImputeArgs {
    pub fn new(reference: &str, query: &str) -> Self {
        Self {
            reference: reference.into(),
            query: query.into(),
            reference_cells: None,
            query_cells: None,
            knn: DEFAULT_KNN,
            weighting: KnnWeighting::default(),
        }
    }
}

/// Reference features x query cells
#[derive(Clone, Debug)]
pub struct ImputationResult {
    pub reference: Box<str>,
    pub query: Box<str>,
    pub row_names: Vec<Box<str>>,
    pub column_names: Vec<Box<str>>,
    pub data: Mat,
}

/// Impute the reference dataset's features for query cells by
/// averaging the values of their nearest reference cells in the
/// embedding.
///
/// * `datasets` - source of the reference feature values
/// * `embedding` - coordinates used for the neighbour search
/// * `args` - which cells, how many neighbours, how to weight them
pub fn impute_features(
    datasets: &DatasetSet,
    embedding: &JointEmbedding,
    args: &ImputeArgs,
) -> anyhow::Result<ImputationResult> {
    if args.knn == 0 {
        return Err(MungError::invalid("imputation requires at least one neighbour").into());
    }

    let reference = datasets.require(&args.reference)?;
    let query = datasets.require(&args.query)?;

    let ref_columns = match args.reference_cells.as_ref() {
        Some(cells) => cell_positions(reference, cells)?,
        None => (0..reference.num_cells()).collect(),
    };

    if args.knn > ref_columns.len() {
        return Err(MungError::EmptyNeighborhood {
            reference: args.reference.clone(),
            knn: args.knn,
            available: ref_columns.len(),
        }
        .into());
    }

    let query_cells: Vec<Box<str>> = match args.query_cells.as_ref() {
        Some(cells) => {
            cell_positions(query, cells)?;
            cells.clone()
        }
        None => query.column_names().to_vec(),
    };

    let ref_cells: Vec<Box<str>> = ref_columns
        .iter()
        .map(|&j| reference.column_names()[j].clone())
        .collect();

    let ref_rows = embedding.rows_of(&ref_cells)?;
    let query_rows = embedding.rows_of(&query_cells)?;

    let ref_set: HashSet<usize> = ref_rows.iter().copied().collect();
    let noverlap = query_rows.iter().filter(|r| ref_set.contains(r)).count();
    if noverlap > 0 {
        warn!(
            "{} query cells are also reference cells for '{}'",
            noverlap, args.reference
        );
    }

    let dict = ColumnDict::from_matrix_rows(
        embedding.data(),
        &ref_rows,
        (0..ref_rows.len()).collect::<Vec<usize>>(),
    );

    let xx = reference.data();
    let zz = embedding.data();

    let columns: Vec<DVec> = query_rows
        .par_iter()
        .progress_count(query_rows.len() as u64)
        .map(|&i| {
            let (neighbours, distances) = dict.search_by_query_data(&zz.row(i).to_vp(), args.knn);
            let weights = neighbour_weights(&distances, args.weighting);

            let mut ret = DVec::zeros(xx.nrows());
            for (&j, &w) in neighbours.iter().zip(weights.iter()) {
                ret.axpy(w, &xx.column(ref_columns[j]), 1.0);
            }
            ret
        })
        .collect();

    let data = if columns.is_empty() {
        Mat::zeros(xx.nrows(), 0)
    } else {
        Mat::from_columns(&columns)
    };

    info!(
        "imputed {} '{}' features for {} '{}' cells (k = {})",
        data.nrows(),
        args.reference,
        data.ncols(),
        args.query,
        args.knn
    );

    Ok(ImputationResult {
        reference: args.reference.clone(),
        query: args.query.clone(),
        row_names: reference.row_names().to_vec(),
        column_names: query_cells,
        data,
    })
}

/// Column positions of the named cells within `dataset`
fn cell_positions(dataset: &Dataset, cells: &[Box<str>]) -> anyhow::Result<Vec<usize>> {
    let name2col: HashMap<&str, usize> = dataset
        .column_names()
        .iter()
        .enumerate()
        .map(|(j, c)| (c.as_ref(), j))
        .collect();

    cells
        .iter()
        .map(|c| {
            name2col.get(c.as_ref()).copied().ok_or_else(|| {
                MungError::invalid(format!("cell '{}' is not in '{}'", c, dataset.name())).into()
            })
        })
        .collect()
}

/// Weights summing to one, aligned with `distances`
fn neighbour_weights(distances: &[f32], weighting: KnnWeighting) -> Vec<f32> {
    let n = distances.len();
    if n == 0 {
        return vec![];
    }
    match weighting {
        KnnWeighting::Uniform => vec![1.0 / n as f32; n],
        KnnWeighting::Distance => {
            let max_neg = distances
                .iter()
                .map(|&d| -d)
                .fold(f32::NEG_INFINITY, f32::max);
            let exp_vals: Vec<f32> = distances.iter().map(|&d| (-d - max_neg).exp()).collect();
            let denom: f32 = exp_vals.iter().sum();
            exp_vals.iter().map(|&e| e / denom).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn setup() -> (DatasetSet, JointEmbedding) {
        let sc = Dataset::new(
            "sc",
            Mat::from_row_slice(3, 4, &[1., 2., 3., 4., 10., 20., 30., 40., 0., 1., 0., 1.]),
            vec!["g1".into(), "g2".into(), "g3".into()],
            vec!["s0".into(), "s1".into(), "s2".into(), "s3".into()],
        )
        .unwrap();
        let sp = Dataset::new(
            "sp",
            Mat::from_row_slice(1, 2, &[5., 6.]),
            vec!["g1".into()],
            vec!["p0".into(), "p1".into()],
        )
        .unwrap();
        let set = DatasetSet::new(vec![sc, sp]).unwrap();

        // 1-d embedding: s0..s3 at 0, 1, 2, 3; p0 at 0.9, p1 at 2.6
        let zz = Mat::from_column_slice(6, 1, &[0., 1., 2., 3., 0.9, 2.6]);
        let emb = JointEmbedding::from_blocks(set.cell_names(), vec![("sc".into(), zz)]).unwrap();
        (set, emb)
    }

    #[test]
    fn uniform_average_of_nearest_reference_cells() -> anyhow::Result<()> {
        let (set, emb) = setup();
        let args = ImputeArgs {
            knn: 2,
            ..ImputeArgs::new("sc", "sp")
        };
        let out = impute_features(&set, &emb, &args)?;

        assert_eq!(out.data.shape(), (3, 2));
        // p0 -> s1, s0 ; p1 -> s3, s2
        assert_abs_diff_eq!(out.data[(0, 0)], 1.5);
        assert_abs_diff_eq!(out.data[(1, 1)], 35.0);
        let expected: Vec<Box<str>> = vec!["p0".into(), "p1".into()];
        assert_eq!(out.column_names, expected);
        Ok(())
    }

    #[test]
    fn self_query_recovers_values() -> anyhow::Result<()> {
        let (set, emb) = setup();
        let args = ImputeArgs {
            knn: 1,
            ..ImputeArgs::new("sc", "sc")
        };
        let out = impute_features(&set, &emb, &args)?;
        assert_abs_diff_eq!(out.data, set.at(0).data().clone());
        Ok(())
    }

    #[test]
    fn distance_weights_favour_closer_cells() -> anyhow::Result<()> {
        let ww = neighbour_weights(&[0.1, 0.9], KnnWeighting::Distance);
        assert_abs_diff_eq!(ww.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(ww[0] > ww[1]);

        let (set, emb) = setup();
        let args = ImputeArgs {
            knn: 2,
            weighting: KnnWeighting::Distance,
            reference_cells: Some(vec!["s0".into(), "s1".into()]),
            ..ImputeArgs::new("sc", "sp")
        };
        let out = impute_features(&set, &emb, &args)?;
        // p0 is closer to s1 (value 2) than s0 (value 1)
        assert!(out.data[(0, 0)] > 1.5 && out.data[(0, 0)] < 2.0);
        Ok(())
    }

    #[test]
    fn neighbourhood_checks_come_first() {
        let (set, emb) = setup();

        let args = ImputeArgs {
            knn: 10,
            ..ImputeArgs::new("sc", "sp")
        };
        let err = impute_features(&set, &emb, &args).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MungError>(),
            Some(&MungError::EmptyNeighborhood {
                reference: "sc".into(),
                knn: 10,
                available: 4
            })
        );

        for args in [
            ImputeArgs {
                knn: 0,
                ..ImputeArgs::new("sc", "sp")
            },
            ImputeArgs {
                knn: 1,
                query_cells: Some(vec!["nope".into()]),
                ..ImputeArgs::new("sc", "sp")
            },
            ImputeArgs::new("sc", "zz"),
        ] {
            let err = impute_features(&set, &emb, &args).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MungError>(),
                Some(MungError::InvalidConfiguration(_))
            ));
        }
    }
}

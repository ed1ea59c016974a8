use rayon::prelude::*;
use std::fmt::Debug;

/// Below this many points we scan all of them instead of building an
/// approximate index.
pub const EXACT_SEARCH_LIMIT: usize = 5_000;

/// Seed for the HNSW layer assignment
const HNSW_SEED: u64 = 42;

/// Candidate list size of the HNSW search; an approximate search
/// returns at most this many neighbours
const HNSW_EF_SEARCH: usize = 100;

/// A dictionary for fast column look-up
///
/// Small dictionaries are searched exhaustively; large ones go
/// through an `instant_distance::HnswMap`. Either way the neighbours
/// come back sorted by distance, ties broken by insertion order.
pub struct ColumnDict<T> {
    dict: Option<instant_distance::HnswMap<VecPoint, usize>>,
    data_vec: Vec<VecPoint>,
    names: Vec<T>,
}

impl<T> ColumnDict<T>
where
    T: Clone + Debug + Send + Sync,
{
    /// Build a dictionary from the selected rows of a matrix, e.g., a
    /// subset of cells of a cell x dimension embedding
    pub fn from_matrix_rows(data: &nalgebra::DMatrix<f32>, rows: &[usize], names: Vec<T>) -> Self {
        let data_vec = rows
            .par_iter()
            .map(|&i| data.row(i).to_vp())
            .collect::<Vec<_>>();
        Self::from_points(data_vec, names, EXACT_SEARCH_LIMIT)
    }

    /// Build a dictionary, switching to an approximate index when
    /// there are more than `exact_limit` points
    pub fn from_points(data_vec: Vec<VecPoint>, names: Vec<T>, exact_limit: usize) -> Self {
        debug_assert!(
            data_vec.len() == names.len(),
            "Data and names must have the same length"
        );

        let dict = if data_vec.len() > exact_limit {
            use instant_distance::Builder;
            let index = (0..data_vec.len()).collect::<Vec<_>>();
            Some(
                Builder::default()
                    .seed(HNSW_SEED)
                    .ef_search(HNSW_EF_SEARCH)
                    .build(data_vec.clone(), index),
            )
        } else {
            None
        };

        ColumnDict {
            dict,
            data_vec,
            names,
        }
    }

    /// k-nearest neighbour search of a query vector
    ///
    /// * `query` - a point with the same dimension as the stored ones
    /// * `knn` - the number of nearest neighbours to return
    ///
    /// Returns the names and distances, nearest first. Asking for more
    /// neighbours than the approximate search can deliver falls back
    /// to the exhaustive scan.
    pub fn search_by_query_data(&self, query: &VecPoint, knn: usize) -> (Vec<T>, Vec<f32>) {
        let nquery = knn.min(self.data_vec.len());

        let hits: Vec<(usize, f32)> = match &self.dict {
            Some(dict) if nquery <= HNSW_EF_SEARCH => {
                use instant_distance::Search;
                let mut search = Search::default();
                dict.search(query, &mut search)
                    .take(nquery)
                    .map(|item| (*item.value, item.distance))
                    .collect()
            }
            _ => {
                let mut dist: Vec<(usize, f32)> = self
                    .data_vec
                    .iter()
                    .enumerate()
                    .map(|(j, x)| (j, x.euclidean(query)))
                    .collect();
                dist.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                dist.truncate(nquery);
                dist
            }
        };

        hits.into_iter()
            .map(|(j, d)| (self.names[j].clone(), d))
            .unzip()
    }
}

#[derive(Clone, Debug)]
/// a wrapper for Vec<f32>
pub struct VecPoint {
    pub data: Vec<f32>,
}

impl VecPoint {
    pub fn euclidean(&self, other: &Self) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}

pub trait MakeVecPoint {
    fn to_vp(&self) -> VecPoint;
}

impl<S> MakeVecPoint for nalgebra::Matrix<f32, nalgebra::U1, nalgebra::Dyn, S>
where
    S: nalgebra::RawStorage<f32, nalgebra::U1, nalgebra::Dyn>,
{
    fn to_vp(&self) -> VecPoint {
        VecPoint {
            data: self.iter().cloned().collect(),
        }
    }
}

impl instant_distance::Point for VecPoint {
    fn distance(&self, other: &Self) -> f32 {
        self.euclidean(other)
    }
}

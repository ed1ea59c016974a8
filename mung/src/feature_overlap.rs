use crate::common::*;
use crate::dataset::DatasetSet;
use rayon::prelude::*;
use std::collections::VecDeque;

/// Which features each pair of datasets has in common
///
/// Shared features of a pair `(i, j)` with `i < j` follow the row
/// order of dataset `i`.
pub struct FeatureOverlapGraph {
    names: Vec<Box<str>>,
    shared: HashMap<(usize, usize), Vec<Box<str>>>,
}

/// Breadth-first traversal from a root dataset over the overlap graph
pub struct PathTree {
    pub root: usize,
    /// reachable datasets in visiting order, root excluded
    pub order: Vec<usize>,
    /// `parent[d]`: the dataset `d` is reached from
    pub parent: Vec<Option<usize>>,
}

impl PathTree {
    pub fn is_reachable(&self, d: usize) -> bool {
        d == self.root || self.parent[d].is_some()
    }
}

impl FeatureOverlapGraph {
    pub fn build(datasets: &DatasetSet) -> Self {
        let nd = datasets.len();
        let pairs: Vec<(usize, usize)> = (0..nd)
            .flat_map(|i| ((i + 1)..nd).map(move |j| (i, j)))
            .collect();

        let shared = pairs
            .into_par_iter()
            .map(|(i, j)| {
                let other = datasets.at(j);
                let common: Vec<Box<str>> = datasets
                    .at(i)
                    .unique_features()
                    .into_iter()
                    .filter(|f| other.has_feature(f))
                    .collect();
                ((i, j), common)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<HashMap<_, _>>();

        let ret = Self {
            names: datasets.names(),
            shared,
        };

        for ((i, j), common) in ret.sorted_pairs() {
            debug!(
                "{} features shared by '{}' and '{}'",
                common.len(),
                ret.names[i],
                ret.names[j]
            );
        }
        ret
    }

    pub fn num_datasets(&self) -> usize {
        self.names.len()
    }

    fn index_of(&self, name: &str) -> anyhow::Result<usize> {
        self.names
            .iter()
            .position(|x| x.as_ref() == name)
            .ok_or_else(|| MungError::invalid(format!("unknown dataset '{}'", name)).into())
    }

    /// Shared features of datasets at `i` and `j` (symmetric)
    pub fn shared_by_index(&self, i: usize, j: usize) -> &[Box<str>] {
        let key = if i < j { (i, j) } else { (j, i) };
        self.shared.get(&key).map(|x| x.as_slice()).unwrap_or(&[])
    }

    /// Shared features of two named datasets (symmetric)
    pub fn shared(&self, a: &str, b: &str) -> anyhow::Result<&[Box<str>]> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Ok(self.shared_by_index(i, j))
    }

    /// All pairs `(i, j)`, `i < j`, in lexicographic order
    pub fn sorted_pairs(&self) -> Vec<((usize, usize), &[Box<str>])> {
        let mut ret = self
            .shared
            .iter()
            .map(|(&k, v)| (k, v.as_slice()))
            .collect::<Vec<_>>();
        ret.sort_by_key(|&(k, _)| k);
        ret
    }

    /// Datasets sharing at least one feature with `d`, in set order
    pub fn neighbours(&self, d: usize) -> Vec<usize> {
        (0..self.num_datasets())
            .filter(|&e| e != d && !self.shared_by_index(d, e).is_empty())
            .collect()
    }

    /// Every reference must be linked to at least one other dataset.
    /// A lone dataset has nothing to link and passes.
    pub fn check_references(&self, references: &[Box<str>]) -> anyhow::Result<()> {
        if self.num_datasets() < 2 {
            return Ok(());
        }
        for r in references {
            let d = self.index_of(r)?;
            if self.neighbours(d).is_empty() {
                return Err(MungError::DisjointFeatures {
                    reference: r.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Breadth-first traversal from `root`; among equally short
    /// routes the earlier dataset in set order becomes the parent
    pub fn path_tree(&self, root: usize) -> PathTree {
        let nd = self.num_datasets();
        let mut parent = vec![None; nd];
        let mut visited = vec![false; nd];
        let mut order = vec![];
        let mut queue = VecDeque::from([root]);
        visited[root] = true;

        while let Some(d) = queue.pop_front() {
            for e in self.neighbours(d) {
                if !visited[e] {
                    visited[e] = true;
                    parent[e] = Some(d);
                    order.push(e);
                    queue.push_back(e);
                }
            }
        }

        PathTree {
            root,
            order,
            parent,
        }
    }
}

use crate::common::*;
use matrix_util::dmatrix_util::{subset_columns, subset_rows};
use rand::Rng;

/// Named categorical annotations of cells, one value per cell
#[derive(Clone, Debug, Default)]
pub struct CellMetadata {
    names: Vec<Box<str>>,
    columns: Vec<Vec<Box<str>>>,
}

impl CellMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a label column
    pub fn add_column(&mut self, name: &str, values: Vec<Box<str>>) {
        if let Some(k) = self.names.iter().position(|x| x.as_ref() == name) {
            self.columns[k] = values;
        } else {
            self.names.push(name.into());
            self.columns.push(values);
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Box<str>]> {
        self.names
            .iter()
            .position(|x| x.as_ref() == name)
            .map(|k| self.columns[k].as_slice())
    }

    pub fn column_names(&self) -> &[Box<str>] {
        &self.names
    }

    fn lengths(&self) -> impl Iterator<Item = (&Box<str>, usize)> {
        self.names.iter().zip(self.columns.iter().map(|x| x.len()))
    }

    fn subset(&self, cells: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| cells.iter().map(|&j| col[j].clone()).collect())
                .collect(),
        }
    }
}

/// One measured dataset: a feature x cell matrix with names and
/// optional per-cell annotations
#[derive(Clone, Debug)]
pub struct Dataset {
    name: Box<str>,
    data: Mat,
    row_names: Vec<Box<str>>,
    column_names: Vec<Box<str>>,
    feature_index: HashMap<Box<str>, usize>,
    metadata: Option<CellMetadata>,
    coordinates: Option<Mat>,
}

impl Dataset {
    /// * `name` - dataset name, e.g., "sce" or "spe"
    /// * `data` - feature x cell matrix of normalized values
    /// * `row_names` - feature identifiers
    /// * `column_names` - cell identifiers
    pub fn new(
        name: &str,
        data: Mat,
        row_names: Vec<Box<str>>,
        column_names: Vec<Box<str>>,
    ) -> anyhow::Result<Self> {
        if data.nrows() != row_names.len() || data.ncols() != column_names.len() {
            return Err(MungError::ShapeMismatch {
                dataset: name.into(),
                message: format!(
                    "matrix is {} x {} but there are {} feature and {} cell names",
                    data.nrows(),
                    data.ncols(),
                    row_names.len(),
                    column_names.len()
                ),
            }
            .into());
        }

        let mut seen = HashSet::default();
        for c in column_names.iter() {
            if !seen.insert(c.clone()) {
                return Err(MungError::OverlappingCells {
                    cell: c.clone(),
                    first: name.into(),
                    second: name.into(),
                }
                .into());
            }
        }

        let mut feature_index = HashMap::default();
        let mut ndup = 0;
        for (i, r) in row_names.iter().enumerate() {
            if feature_index.contains_key(r) {
                ndup += 1;
            } else {
                feature_index.insert(r.clone(), i);
            }
        }
        if ndup > 0 {
            warn!(
                "{}: {} duplicated feature names; keeping the first occurrence",
                name, ndup
            );
        }

        Ok(Self {
            name: name.into(),
            data,
            row_names,
            column_names,
            feature_index,
            metadata: None,
            coordinates: None,
        })
    }

    /// Attach per-cell labels; every column must cover all cells
    pub fn with_metadata(mut self, metadata: CellMetadata) -> anyhow::Result<Self> {
        if let Some((col, len)) = metadata.lengths().find(|&(_, n)| n != self.num_cells()) {
            return Err(MungError::ShapeMismatch {
                dataset: self.name.clone(),
                message: format!(
                    "metadata '{}' has {} values for {} cells",
                    col,
                    len,
                    self.num_cells()
                ),
            }
            .into());
        }
        self.metadata = Some(metadata);
        Ok(self)
    }

    /// Attach spatial coordinates, one row per cell
    pub fn with_coordinates(mut self, coordinates: Mat) -> anyhow::Result<Self> {
        if coordinates.nrows() != self.num_cells() {
            return Err(MungError::ShapeMismatch {
                dataset: self.name.clone(),
                message: format!(
                    "{} coordinate rows for {} cells",
                    coordinates.nrows(),
                    self.num_cells()
                ),
            }
            .into());
        }
        self.coordinates = Some(coordinates);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// feature x cell
    pub fn data(&self) -> &Mat {
        &self.data
    }

    pub fn row_names(&self) -> &[Box<str>] {
        &self.row_names
    }

    pub fn column_names(&self) -> &[Box<str>] {
        &self.column_names
    }

    pub fn num_features(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.data.ncols()
    }

    pub fn metadata(&self) -> Option<&CellMetadata> {
        self.metadata.as_ref()
    }

    pub fn coordinates(&self) -> Option<&Mat> {
        self.coordinates.as_ref()
    }

    /// Row position of a feature (first occurrence)
    pub fn feature_position(&self, feature: &str) -> Option<usize> {
        self.feature_index.get(feature).copied()
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.feature_index.contains_key(feature)
    }

    /// Distinct features in row order
    pub fn unique_features(&self) -> Vec<Box<str>> {
        self.row_names
            .iter()
            .enumerate()
            .filter(|(i, r)| self.feature_index.get(*r) == Some(i))
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Values of the named features (rows, in the given order) for
    /// all cells
    pub fn select_features(&self, features: &[Box<str>]) -> anyhow::Result<Mat> {
        let rows = features
            .iter()
            .map(|f| {
                self.feature_position(f).ok_or_else(|| {
                    anyhow::anyhow!("feature '{}' not found in '{}'", f, self.name)
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        subset_rows(&self.data, rows)
    }

    /// A copy keeping only the named features
    pub fn restrict_features(&self, features: &[Box<str>]) -> anyhow::Result<Self> {
        let data = self.select_features(features)?;
        let mut ret = Dataset::new(&self.name, data, features.to_vec(), self.column_names.clone())?;
        ret.metadata = self.metadata.clone();
        ret.coordinates = self.coordinates.clone();
        Ok(ret)
    }

    /// A copy keeping the cells at `cells` (column positions)
    pub fn subset_cells(&self, cells: &[usize]) -> anyhow::Result<Self> {
        let data = subset_columns(&self.data, cells.iter().copied())?;
        let column_names = cells.iter().map(|&j| self.column_names[j].clone()).collect();
        let mut ret = Dataset::new(&self.name, data, self.row_names.clone(), column_names)?;
        ret.metadata = self.metadata.as_ref().map(|m| m.subset(cells));
        if let Some(coord) = self.coordinates.as_ref() {
            ret.coordinates = Some(subset_rows(coord, cells.iter().copied())?);
        }
        Ok(ret)
    }

    /// Randomly keep at most `ncells` cells, in their original order
    pub fn subsample_cells<R: Rng>(&self, ncells: usize, rng: &mut R) -> anyhow::Result<Self> {
        if ncells >= self.num_cells() {
            return Ok(self.clone());
        }
        let mut cells = rand::seq::index::sample(rng, self.num_cells(), ncells).into_vec();
        cells.sort_unstable();
        info!(
            "{}: subsampled {} of {} cells",
            self.name,
            ncells,
            self.num_cells()
        );
        self.subset_cells(&cells)
    }
}

/// Datasets of one integration run, in a fixed order, with globally
/// unique cell names
#[derive(Clone, Debug)]
pub struct DatasetSet {
    datasets: Vec<Dataset>,
    name2index: HashMap<Box<str>, usize>,
}

impl DatasetSet {
    /// Fails if two datasets share a name or a cell identifier
    pub fn new(datasets: Vec<Dataset>) -> anyhow::Result<Self> {
        if datasets.is_empty() {
            return Err(MungError::invalid("no datasets").into());
        }

        let mut name2index = HashMap::default();
        for (d, x) in datasets.iter().enumerate() {
            if name2index.insert(x.name.clone(), d).is_some() {
                return Err(
                    MungError::invalid(format!("duplicate dataset name '{}'", x.name)).into(),
                );
            }
        }

        let mut cell2dataset: HashMap<&str, usize> = HashMap::default();
        for (d, x) in datasets.iter().enumerate() {
            for c in x.column_names.iter() {
                if let Some(&prev) = cell2dataset.get(c.as_ref()) {
                    return Err(MungError::OverlappingCells {
                        cell: c.clone(),
                        first: datasets[prev].name.clone(),
                        second: x.name.clone(),
                    }
                    .into());
                }
                cell2dataset.insert(c.as_ref(), d);
            }
        }

        Ok(Self {
            datasets,
            name2index,
        })
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dataset> {
        self.datasets.iter()
    }

    pub fn names(&self) -> Vec<Box<str>> {
        self.datasets.iter().map(|x| x.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name2index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.index_of(name).map(|d| &self.datasets[d])
    }

    pub fn at(&self, d: usize) -> &Dataset {
        &self.datasets[d]
    }

    /// Look up a dataset named in configuration
    pub fn require(&self, name: &str) -> anyhow::Result<&Dataset> {
        self.get(name)
            .ok_or_else(|| MungError::invalid(format!("unknown dataset '{}'", name)).into())
    }

    pub fn num_cells(&self) -> usize {
        self.datasets.iter().map(|x| x.num_cells()).sum()
    }

    /// All cell names, dataset by dataset
    pub fn cell_names(&self) -> Vec<Box<str>> {
        self.datasets
            .iter()
            .flat_map(|x| x.column_names.iter().cloned())
            .collect()
    }

    /// A new set with the named datasets in the given order
    pub fn select(&self, names: &[Box<str>]) -> anyhow::Result<Self> {
        let datasets = names
            .iter()
            .map(|n| self.require(n).cloned())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(datasets)
    }

    /// A new set with every dataset restricted to the features
    /// measured in all of them
    pub fn restrict_to_common_features(&self) -> anyhow::Result<Self> {
        let first = &self.datasets[0];
        let common: Vec<Box<str>> = first
            .unique_features()
            .into_iter()
            .filter(|f| self.datasets[1..].iter().all(|x| x.has_feature(f)))
            .collect();

        if common.is_empty() {
            return Err(MungError::invalid("no feature is shared by all datasets").into());
        }
        info!("{} features shared by all datasets", common.len());

        let datasets = self
            .datasets
            .iter()
            .map(|x| x.restrict_features(&common))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(datasets)
    }
}

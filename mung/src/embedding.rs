use crate::common::*;
use std::ops::Range;

/// Contiguous columns of a joint embedding owned by one reference
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingBlock {
    pub name: Box<str>,
    pub start: usize,
    pub width: usize,
}

impl EmbeddingBlock {
    pub fn range(&self) -> Range<usize> {
        self.start..(self.start + self.width)
    }
}

/// A cell x dimension embedding whose columns are partitioned into
/// one block per reference dataset
#[derive(Clone, Debug)]
pub struct JointEmbedding {
    data: Mat,
    cell_names: Vec<Box<str>>,
    blocks: Vec<EmbeddingBlock>,
    cell2row: HashMap<Box<str>, usize>,
}

impl JointEmbedding {
    /// Stack per-reference blocks (each cell x rank) side by side
    pub fn from_blocks(cell_names: Vec<Box<str>>, blocks: Vec<(Box<str>, Mat)>) -> anyhow::Result<Self> {
        let mut layout = Vec::with_capacity(blocks.len());
        let mut start = 0;
        for (name, mat) in blocks.iter() {
            layout.push(EmbeddingBlock {
                name: name.clone(),
                start,
                width: mat.ncols(),
            });
            start += mat.ncols();
        }
        let mats = blocks.into_iter().map(|(_, m)| m).collect::<Vec<_>>();
        let data = matrix_util::dmatrix_util::concatenate_horizontal(&mats)?;
        Self::new(data, cell_names, layout)
    }

    pub fn new(
        data: Mat,
        cell_names: Vec<Box<str>>,
        blocks: Vec<EmbeddingBlock>,
    ) -> anyhow::Result<Self> {
        if data.nrows() != cell_names.len() {
            return Err(anyhow::anyhow!(
                "{} embedding rows for {} cells",
                data.nrows(),
                cell_names.len()
            ));
        }

        let mut expected_start = 0;
        for b in blocks.iter() {
            if b.start != expected_start {
                return Err(anyhow::anyhow!("block '{}' is not contiguous", b.name));
            }
            expected_start += b.width;
        }
        if expected_start != data.ncols() {
            return Err(anyhow::anyhow!(
                "blocks cover {} of {} dimensions",
                expected_start,
                data.ncols()
            ));
        }

        let mut cell2row = HashMap::default();
        for (i, c) in cell_names.iter().enumerate() {
            if cell2row.insert(c.clone(), i).is_some() {
                return Err(anyhow::anyhow!("duplicate cell '{}' in the embedding", c));
            }
        }

        Ok(Self {
            data,
            cell_names,
            blocks,
            cell2row,
        })
    }

    /// Same cells and blocks, new coordinates
    pub fn with_data(&self, data: Mat) -> anyhow::Result<Self> {
        if data.shape() != self.data.shape() {
            return Err(anyhow::anyhow!(
                "shape {:?} differs from {:?}",
                data.shape(),
                self.data.shape()
            ));
        }
        Ok(Self {
            data,
            cell_names: self.cell_names.clone(),
            blocks: self.blocks.clone(),
            cell2row: self.cell2row.clone(),
        })
    }

    /// cell x dimension
    pub fn data(&self) -> &Mat {
        &self.data
    }

    pub fn cell_names(&self) -> &[Box<str>] {
        &self.cell_names
    }

    pub fn blocks(&self) -> &[EmbeddingBlock] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&EmbeddingBlock> {
        self.blocks.iter().find(|b| b.name.as_ref() == name)
    }

    pub fn num_cells(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_dims(&self) -> usize {
        self.data.ncols()
    }

    /// `{block}_PC{k}`, counting from 1 within each block
    pub fn column_names(&self) -> Vec<Box<str>> {
        self.blocks
            .iter()
            .flat_map(|b| (1..=b.width).map(move |k| format!("{}_PC{}", b.name, k).into_boxed_str()))
            .collect()
    }

    pub fn row_of(&self, cell: &str) -> Option<usize> {
        self.cell2row.get(cell).copied()
    }

    /// Row positions of the named cells; unknown names are a
    /// configuration error
    pub fn rows_of(&self, cells: &[Box<str>]) -> anyhow::Result<Vec<usize>> {
        cells
            .iter()
            .map(|c| {
                self.row_of(c).ok_or_else(|| {
                    MungError::invalid(format!("cell '{}' is not in the embedding", c)).into()
                })
            })
            .collect()
    }
}

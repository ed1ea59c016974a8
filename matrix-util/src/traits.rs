use crate::common_io::Delimiter;
use rand::Rng;

/// Centre rows or columns
pub trait MatOps {
    type DVec;

    /// Subtract column means and return them
    fn centre_columns_inplace(&mut self) -> Self::DVec;

    /// Subtract row means and return them
    fn centre_rows_inplace(&mut self) -> Self::DVec;
}

/// Operations to sample random matrices. Every draw comes from the
/// generator handed over by the caller, so the same seed reproduces
/// the same matrix.
pub trait SampleOps {
    type Mat;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;
}

/// A matrix with row and column names
pub struct MatWithNames<M> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: M,
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Mat;

    /// Read a matrix with a header line of column names and the row
    /// names in the first column
    fn read_data_with_names(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    fn write_data_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
    ) -> anyhow::Result<()>;
}

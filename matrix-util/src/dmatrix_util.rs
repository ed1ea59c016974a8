use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

type Mat = DMatrix<f32>;
type DVec = DVector<f32>;

impl SampleOps for Mat {
    type Mat = Self;

    fn rnorm<R: Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        // a single sequential stream keeps the draws reproducible
        let rvec: Vec<f32> = (0..(dd * nn))
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        Mat::from_vec(dd, nn, rvec)
    }
}

impl MatOps for Mat {
    type DVec = DVec;

    fn centre_columns_inplace(&mut self) -> Self::DVec {
        let nr = self.nrows();
        let mut mu = DVec::zeros(self.ncols());
        if nr == 0 {
            return mu;
        }
        for (j, mut xx_j) in self.column_iter_mut().enumerate() {
            mu[j] = xx_j.mean();
            xx_j.add_scalar_mut(-mu[j]);
        }
        mu
    }

    fn centre_rows_inplace(&mut self) -> Self::DVec {
        let nc = self.ncols();
        if nc == 0 {
            return DVec::zeros(self.nrows());
        }
        let mu = self.column_mean();
        for mut xx_j in self.column_iter_mut() {
            xx_j -= &mu;
        }
        mu
    }
}

/// Stack matrices side by side `[x1, x2, ...]`
pub fn concatenate_horizontal(xx_vec: &[Mat]) -> anyhow::Result<Mat> {
    let nrows = xx_vec.first().map(|x| x.nrows()).unwrap_or(0);
    if xx_vec.iter().any(|x| x.nrows() != nrows) {
        return Err(anyhow::anyhow!("all matrices need the same number of rows"));
    }
    let ncols = xx_vec.iter().map(|x| x.ncols()).sum::<usize>();
    let mut ret = Mat::zeros(nrows, ncols);
    let mut lb = 0;
    for xx in xx_vec {
        let ub = lb + xx.ncols();
        ret.columns_range_mut(lb..ub).copy_from(xx);
        lb = ub;
    }
    Ok(ret)
}

/// Stack matrices on top of each other `[x1; x2; ...]`
pub fn concatenate_vertical(xx_vec: &[Mat]) -> anyhow::Result<Mat> {
    let ncols = xx_vec.first().map(|x| x.ncols()).unwrap_or(0);
    if xx_vec.iter().any(|x| x.ncols() != ncols) {
        return Err(anyhow::anyhow!(
            "all matrices need the same number of columns"
        ));
    }
    let nrows = xx_vec.iter().map(|x| x.nrows()).sum::<usize>();
    let mut ret = Mat::zeros(nrows, ncols);
    let mut lb = 0;
    for xx in xx_vec {
        let ub = lb + xx.nrows();
        ret.rows_range_mut(lb..ub).copy_from(xx);
        lb = ub;
    }
    Ok(ret)
}

/// Take a subset of columns in the given order
pub fn subset_columns<I>(xx: &Mat, columns: I) -> anyhow::Result<Mat>
where
    I: IntoIterator<Item = usize>,
{
    let columns: Vec<usize> = columns.into_iter().collect();
    if let Some(&j) = columns.iter().find(|&&j| j >= xx.ncols()) {
        return Err(anyhow::anyhow!("column {} out of {}", j, xx.ncols()));
    }
    Ok(xx.select_columns(columns.iter()))
}

/// Take a subset of rows in the given order
pub fn subset_rows<I>(xx: &Mat, rows: I) -> anyhow::Result<Mat>
where
    I: IntoIterator<Item = usize>,
{
    let rows: Vec<usize> = rows.into_iter().collect();
    if let Some(&i) = rows.iter().find(|&&i| i >= xx.nrows()) {
        return Err(anyhow::anyhow!("row {} out of {}", i, xx.nrows()));
    }
    Ok(xx.select_rows(rows.iter()))
}

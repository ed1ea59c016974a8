use crate::traits::SampleOps;
use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::Rng;

type Mat = DMatrix<f32>;
type DVec = DVector<f32>;

const DEFAULT_POWER_ITER: usize = 5;
const DEFAULT_OVERSAMPLE: usize = 5;

pub trait RSVD {
    /// Rank-`rank` decomposition `X ≈ U diag(d) V'`
    ///
    /// Components come out by decreasing singular value (ties keep
    /// their original order) and each column of `U` has its largest
    /// absolute loading positive (the first one on ties), so the same
    /// input and seed always give the same factors.
    fn rsvd<R: Rng>(&self, rank: usize, rng: &mut R) -> anyhow::Result<(Mat, DVec, Mat)>;
}

impl RSVD for Mat {
    fn rsvd<R: Rng>(&self, rank: usize, rng: &mut R) -> anyhow::Result<(Mat, DVec, Mat)> {
        let mut rsvd = RandomizedSVD::new(rank, DEFAULT_POWER_ITER);
        rsvd.compute(self, rng)?;
        Ok((
            rsvd.matrix_u().clone(),
            rsvd.singular_values().clone(),
            rsvd.matrix_v().clone(),
        ))
    }
}

/// Randomized SVD
///
/// Implement Alg 4.4 of Halko et al. (2009)
/// Modified from https://github.com/kazuotani14/RandomizedSvd
///
/// When the requested rank covers the smaller side of the matrix we
/// skip the random range finder and take the exact decomposition.
pub struct RandomizedSVD {
    max_rank: usize,
    iter: usize,
    u_vectors: Mat,
    singular_values: DVec,
    v_vectors: Mat,
}

impl RandomizedSVD {
    pub fn new(max_rank: usize, iter: usize) -> Self {
        Self {
            max_rank,
            iter,
            u_vectors: Mat::zeros(0, 0),
            singular_values: DVec::zeros(0),
            v_vectors: Mat::zeros(0, 0),
        }
    }

    pub fn matrix_u(&self) -> &Mat {
        &self.u_vectors
    }

    pub fn matrix_v(&self) -> &Mat {
        &self.v_vectors
    }

    pub fn singular_values(&self) -> &DVec {
        &self.singular_values
    }

    pub fn compute<R: Rng>(&mut self, xx: &Mat, rng: &mut R) -> anyhow::Result<()> {
        let nr = xx.nrows();
        let nc = xx.ncols();
        let full_rank = nr.min(nc);

        if self.max_rank == 0 || full_rank == 0 {
            anyhow::bail!("rank must be at least 1 [{} x {}]", nr, nc);
        }

        if self.max_rank > full_rank {
            anyhow::bail!(
                "rank {} exceeds the matrix dimensions [{} x {}]",
                self.max_rank,
                nr,
                nc
            );
        }

        let rank = self.max_rank;

        let (uu, dd, vv) = if rank + DEFAULT_OVERSAMPLE >= full_rank {
            debug!("exact svd on [{} x {}]", nr, nc);
            exact_svd(xx)?
        } else {
            let qq = self.rand_subspace_iteration(xx, rank + DEFAULT_OVERSAMPLE, rng);
            let bb = qq.transpose() * xx;
            debug!("final svd on [{} x {}]", bb.nrows(), bb.ncols());
            let (uu_b, dd, vv) = exact_svd(&bb)?;
            (qq * uu_b, dd, vv)
        };

        let (uu, dd, vv) = order_and_orient(uu, dd, vv, rank);
        self.u_vectors = uu;
        self.singular_values = dd;
        self.v_vectors = vv;
        Ok(())
    }

    /// Find an orthonormal matrix whose range approximates the range
    /// of `xx`, re-orthogonalizing between the power iterations
    fn rand_subspace_iteration<R: Rng>(
        &self,
        xx: &Mat,
        rank_and_oversample: usize,
        rng: &mut R,
    ) -> Mat {
        let omega = Mat::rnorm(xx.ncols(), rank_and_oversample, rng);
        let mut qq = (xx * omega).qr().q();

        for i in 0..self.iter {
            let zz = (xx.transpose() * &qq).qr().q();
            qq = (xx * zz).qr().q();
            debug!("power iteration {:>5}", i + 1);
        }

        let kk = rank_and_oversample.min(qq.ncols());
        qq.columns(0, kk).into_owned()
    }
}

fn exact_svd(xx: &Mat) -> anyhow::Result<(Mat, DVec, Mat)> {
    let svd = xx.clone().svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(uu), Some(vt)) => Ok((uu, svd.singular_values, vt.transpose())),
        _ => anyhow::bail!("SVD failed"),
    }
}

/// Keep the top `rank` components by decreasing singular value and
/// flip signs so the largest loading of each `u` is positive
fn order_and_orient(uu: Mat, dd: DVec, vv: Mat, rank: usize) -> (Mat, DVec, Mat) {
    let mut order: Vec<usize> = (0..dd.len()).collect();
    // stable sort: equal values stay in their original order
    order.sort_by(|&a, &b| dd[b].total_cmp(&dd[a]));
    order.truncate(rank);

    let mut u_out = Mat::zeros(uu.nrows(), order.len());
    let mut v_out = Mat::zeros(vv.nrows(), order.len());
    let mut d_out = DVec::zeros(order.len());

    for (k, &j) in order.iter().enumerate() {
        let u_j = uu.column(j);

        let mut pivot = 0;
        for i in 1..u_j.len() {
            if u_j[i].abs() > u_j[pivot].abs() {
                pivot = i;
            }
        }
        let sign = if u_j.len() > 0 && u_j[pivot] < 0.0 {
            -1.0
        } else {
            1.0
        };

        u_out.column_mut(k).copy_from(&(u_j * sign));
        v_out.column_mut(k).copy_from(&(vv.column(j) * sign));
        d_out[k] = dd[j];
    }

    (u_out, d_out, v_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn diagonal_matrix_is_sorted() -> anyhow::Result<()> {
        let xx = Mat::from_diagonal(&DVec::from_vec(vec![1.0, 5.0, 3.0]));
        let (uu, dd, vv) = xx.rsvd(2, &mut StdRng::seed_from_u64(1))?;

        assert_abs_diff_eq!(dd[0], 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(dd[1], 3.0, epsilon = 1e-4);

        // loadings point to the original axes with positive sign
        assert_abs_diff_eq!(uu[(1, 0)], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(uu[(2, 1)], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(vv[(1, 0)], 1.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn randomized_matches_low_rank_reconstruction() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        let aa = Mat::rnorm(60, 3, &mut rng);
        let bb = Mat::rnorm(3, 40, &mut rng);
        let xx = &aa * &bb;

        let (uu, dd, vv) = xx.rsvd(3, &mut rng)?;
        let xx_hat = &uu * Mat::from_diagonal(&dd) * vv.transpose();

        let rel = (&xx - xx_hat).norm() / xx.norm();
        assert!(rel < 1e-3, "relative error {}", rel);

        let utu = uu.transpose() * &uu;
        assert_abs_diff_eq!(utu, Mat::identity(3, 3), epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn rank_beyond_dimensions_fails() {
        let xx = Mat::identity(4, 3);
        assert!(xx.rsvd(4, &mut StdRng::seed_from_u64(0)).is_err());
        assert!(xx.rsvd(0, &mut StdRng::seed_from_u64(0)).is_err());
    }
}

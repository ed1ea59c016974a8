pub use log::{debug, info, warn};

pub const DEFAULT_KNN: usize = 10;
pub const DEFAULT_RANK: usize = 50;
pub const DEFAULT_MIN_MNN_PAIRS: usize = 3;
pub const DEFAULT_SEED: u64 = 42;

/// Block totals after reweighting with explicit weights
pub const REWEIGHT_TOTAL: f32 = 1e6;

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;

pub use crate::error::MungError;

pub use fnv::FnvHashMap as HashMap;
pub use fnv::FnvHashSet as HashSet;

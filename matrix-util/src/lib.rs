pub mod common_io; // gz-aware line readers and writers
pub mod dmatrix_io; // delimited text i/o for `DMatrix`
pub mod dmatrix_rsvd; // randomized and exact svd
pub mod dmatrix_util; // column/row operations on `DMatrix`
pub mod knn_match; // column dictionary for nearest neighbour search
pub mod traits;

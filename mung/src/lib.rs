//! Mosaic integration of datasets measuring overlapping feature panels
//!
//! Datasets are embedded against one or more references by projecting
//! through shared features, the reference blocks are rebalanced,
//! batches are aligned by mutual nearest neighbours, and missing
//! features are imputed from nearest reference cells.

pub mod common;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod feature_overlap;
pub mod impute;
pub mod io;
pub mod mnn_correct;
pub mod pipeline;
pub mod reweight;
pub mod setting;
pub mod stabilized_embed;

pub use dataset::{CellMetadata, Dataset, DatasetSet};
pub use embedding::JointEmbedding;
pub use error::MungError;
pub use feature_overlap::FeatureOverlapGraph;
pub use impute::{impute_features, ImputationResult, ImputeArgs, KnnWeighting};
pub use mnn_correct::{mnn_correct, MnnArgs};
pub use pipeline::{run_integration, IntegrationOut};
pub use reweight::reweight_embedding;
pub use setting::{IntegrationArgs, IntegrationSetting};
pub use stabilized_embed::stabilized_embedding;

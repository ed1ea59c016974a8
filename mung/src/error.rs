//! Error types for mosaic integration

use thiserror::Error;

/// Failures that stop an integration run
///
/// Functions return `anyhow::Result`; callers who need to branch on
/// the failure can `downcast_ref::<MungError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MungError {
    /// A reference shares no feature with any other dataset
    #[error("reference dataset '{reference}' shares no features with any other dataset")]
    DisjointFeatures { reference: Box<str> },

    /// No chain of shared features links a dataset to a reference
    #[error("dataset '{dataset}' cannot be reached from reference '{reference}' through shared features")]
    UnreachableReference {
        dataset: Box<str>,
        reference: Box<str>,
    },

    /// An embedding block is all zeros and cannot be rescaled
    #[error("embedding block '{block}' has zero total magnitude")]
    ZeroNormBlock { block: Box<str> },

    /// Too few mutual nearest neighbours to estimate a correction
    #[error("only {found} mutual nearest neighbour pairs between '{dataset}' and the anchor set (need {required})")]
    InsufficientMatches {
        dataset: Box<str>,
        found: usize,
        required: usize,
    },

    /// More neighbours requested than reference cells available
    #[error("{knn} neighbours requested but '{reference}' only has {available} reference cells")]
    EmptyNeighborhood {
        reference: Box<str>,
        knn: usize,
        available: usize,
    },

    /// Malformed option values
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The same cell identifier appears in two datasets
    #[error("cell '{cell}' appears in both '{first}' and '{second}'")]
    OverlappingCells {
        cell: Box<str>,
        first: Box<str>,
        second: Box<str>,
    },

    /// Names and matrix dimensions disagree
    #[error("dataset '{dataset}': {message}")]
    ShapeMismatch { dataset: Box<str>, message: String },
}

impl MungError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MungError::InvalidConfiguration(msg.into())
    }
}


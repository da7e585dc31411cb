//! VisualData — dataset analysis and embedding pipeline
//!
//! Upload a tabular dataset, profile it, clean it under configurable
//! policies, reduce it to a 2D/3D embedding, and get back a persisted,
//! URL-addressable interactive rendering.
//!
//! # Modules
//!
//! ## Pipeline stages
//! - [`table`] - Tabular loading and the typed column model
//! - [`analysis`] - Structural and statistical profiling
//! - [`cleaning`] - Duplicate removal and missing-value handling
//! - [`reduction`] - PCA / t-SNE / UMAP orchestration with auto selection
//! - [`render`] - Interactive scatter documents and their durable store
//! - [`persistence`] - SQLite table writes under conflict policies
//!
//! ## Surface
//! - [`service`] - The describe / clean / persist / visualize operations
//! - [`error`] - Error taxonomy
//! - [`utils`] - Shared numeric kernels

pub mod analysis;
pub mod cleaning;
pub mod error;
pub mod persistence;
pub mod reduction;
pub mod render;
pub mod service;
pub mod table;
pub mod utils;

pub use error::{Result, VisualdataError};
pub use service::DataService;

//! Asset preservation catalog
//!
//! Versioned, content-addressed storage for the scripts, configuration files
//! and environment variables a system needs to recover from scratch. Assets
//! are deduplicated by blake3 content hash, classified into operational
//! categories, and ranked by recovery priority.
//!
//! The catalog is the durable half of the recovery engine: the orchestration
//! crates read preserved state from here and write validation results back.

pub mod asset;
pub mod classify;
pub mod env;
pub mod error;
pub mod hash;
pub mod scan;
pub mod store;

pub use asset::{Asset, AssetId, AssetKind, EnvVar, NewAsset};
pub use asset::{PRIORITY_CRITICAL, PRIORITY_DEFAULT, PRIORITY_MAX};
pub use classify::{Classifier, KeywordClassifier, KeywordSecretClassifier, SecretClassifier};
pub use env::{preserve_well_known, WELL_KNOWN_ENV_VARS};
pub use error::CatalogError;
pub use hash::{ContentHash, HashError};
pub use scan::{ScanSummary, Scanner};
pub use store::{Catalog, CatalogConfig, CatalogStats, PlanPhaseRecord, MASK_TOKEN};

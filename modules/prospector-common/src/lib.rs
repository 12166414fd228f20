pub mod canonical;
pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use canonical::{canonical_json, content_hash, sha256_hex};
pub use config::Config;
pub use error::{ProspectorError, Result};
pub use types::*;

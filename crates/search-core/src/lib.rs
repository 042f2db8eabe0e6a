//! Shared types for the search service: field/schema definitions, the
//! environment-driven service configuration, and the crate's error taxonomy.

pub mod config;
pub mod error;
pub mod field;
pub mod schema;

pub use config::{SegDict, ServiceConfig, StoreBackend};
pub use error::{CoreError, CoreResult};
pub use field::{Field, FieldType, NativeValue, Sorting, Tokenizer};
pub use schema::Schema;

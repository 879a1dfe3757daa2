// Lineage core
// Graph model shared by the reconciliation engine and repository adapters

pub mod catalog;
pub mod error;
pub mod qualified_name;
pub mod traits;
pub mod types;

pub use catalog::{EntityKind, RelationshipKind, TypeCatalog, TypeDescriptor};
pub use error::{RepositoryError, RepositoryResult};
pub use traits::MetadataRepository;
pub use types::*;

//! Query Transformer: turns list-endpoint query strings into a bounded
//! [`QueryDescriptor`] that a [`crate::store::DocumentStore`] can execute.

mod descriptor;
mod error;
mod features;
mod listing;
mod schema;

#[cfg(test)]
pub use descriptor::Pagination;
pub use descriptor::{Projection, QueryDescriptor, SortDirection, SortKey};
pub use error::QueryError;
pub use features::ApiFeatures;
pub use listing::execute;
pub use schema::{FieldKind, FieldSpec, ResourceSchema};

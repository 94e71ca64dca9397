mod repository;
mod schema;

pub use repository::{NamedTable, Repository};

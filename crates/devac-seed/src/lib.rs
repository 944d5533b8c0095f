//! Devac Seed — columnar on-disk storage for package graphs

pub mod atomic;
pub mod columnar;
pub mod error;
pub mod layout;
pub mod lock;
pub mod reader;
pub mod schema;
pub mod writer;

pub use columnar::{ColumnData, ColumnDesc, ColumnKind, ColumnTable};
pub use error::SeedError;
pub use layout::{SCHEMA_VERSION, has_seed, seed_dir};
pub use lock::{LockOptions, SeedLock};
pub use reader::{SeedReader, overlay};
pub use schema::Relation;
pub use writer::{DeleteReport, SeedWriter, WriteOptions, WriteReport};

#[cfg(test)]
mod tests;

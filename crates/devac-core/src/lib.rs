//! Devac Core — structural graph model, entity IDs, and the parser contract

pub mod hash;
pub mod ids;
pub mod model;
pub mod parse;

pub use hash::{combine_hashes, compute_content_hash, compute_file_hash, random_hash};
pub use ids::{generate_entity_id, is_unresolved, unresolved};
pub use model::{
    BASE_BRANCH, Edge, EdgeType, ExternalRef, ImportStyle, Node, NodeKind, Visibility,
    now_timestamp,
};
pub use parse::{LanguageParser, ParseResult, ParserContext};

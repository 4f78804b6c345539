//! The insertion-point extractor (spec §4.1) and request/message builder
//! (spec §4.2), plus the data-type guesser they both lean on (spec §4.1
//! last paragraph).

pub mod builder;
pub mod extractor;
pub mod graphql;
pub mod guess;
pub mod ws_extractor;

pub use builder::*;
pub use extractor::*;
pub use guess::guess_value_type;
pub use ws_extractor::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InsertionError {
    #[error("unsupported insertion point type: {0}")]
    UnsupportedInsertionPoint(String),
    #[error("malformed body for content-type {content_type}: {reason}")]
    MalformedBody { content_type: String, reason: String },
    #[error("malformed URL: {0}")]
    MalformedUrl(String),
    #[error("malformed GraphQL document: {0}")]
    MalformedGraphql(String),
}

pub type Result<T> = std::result::Result<T, InsertionError>;

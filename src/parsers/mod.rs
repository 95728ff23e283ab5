//! Reader for the translator output format: a versioned text stream of
//! whitespace-separated tokens delimited by `begin_.../end_...` magic
//! markers. Any mismatch is a hard error carrying the offending token and
//! its line number.

mod token_stream;

pub use token_stream::{ParseError, TokenStream};

/// The schema version this reader understands. Files produced for other
/// versions are rejected up front.
pub const EXPECTED_FILE_VERSION: u32 = 3;

//! Visit intake: validation, file parsing and batch upsert.
//!
//! ```text
//! upload bytes ──► parser ──► validator::prepare ──► batch ──► Database::upsert_visit
//! form / JSON ─────────────► validator::prepare ──┘
//! ```

pub mod batch;
pub mod parser;
pub mod validator;

pub use batch::{process_batch, BatchOutcome, RecordError};
pub use parser::{FileFormat, LineError, ParseError, ParseSummary, ParsedFile, ParsedRecord};
pub use validator::{normalize_identifier, prepare, validate, Validation};

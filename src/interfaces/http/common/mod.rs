//! Envelope, extractors and query helpers shared by the HTTP modules

pub mod envelope;
pub mod query;
pub mod validated_json;

pub use envelope::{OcpiError, OcpiResponse};
pub use query::{page_request, PageQuery};
pub use validated_json::{OcpiJson, ValidatedJson};

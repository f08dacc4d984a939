//! Type definitions for raw loan records and inference responses

pub mod record;
pub mod response;

pub use record::{RawRecord, RawTable, RawValue};
pub use response::PredictionResponse;

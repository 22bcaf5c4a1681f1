pub mod answer;
pub mod document;
pub mod filters;
pub mod label;

pub use answer::{sort_answers, Answer, Span};
pub use document::{content_id, Document, FileInput};
pub use filters::Filters;
pub use label::{Label, USER_FEEDBACK_ORIGIN};

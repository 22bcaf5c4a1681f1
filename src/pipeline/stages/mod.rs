//! Built-in stage types.

pub mod converter;
pub mod join;
pub mod preprocessor;
pub mod reader;
pub mod retriever;
pub mod writer;

pub use converter::TextConverter;
pub use join::JoinDocuments;
pub use preprocessor::PreProcessor;
pub use reader::ExtractiveReader;
pub use retriever::Bm25Retriever;
pub use writer::DocumentWriter;

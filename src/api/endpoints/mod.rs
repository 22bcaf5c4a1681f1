pub mod documents;
pub mod feedback;
pub mod file_upload;
pub mod search;

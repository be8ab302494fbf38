pub mod extractors;
pub mod form;
pub mod posts;
pub mod upload;

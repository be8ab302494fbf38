pub mod posts;
pub mod response;

pub mod posts;
pub mod uploads;

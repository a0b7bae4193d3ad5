pub mod cache;
pub mod common;
pub mod files;

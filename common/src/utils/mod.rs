pub mod config;
pub mod sanitize;

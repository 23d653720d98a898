pub mod catalog;
pub mod requests;

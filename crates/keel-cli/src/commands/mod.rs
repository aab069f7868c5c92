pub mod build;
pub mod env;
pub mod get;
pub mod list;

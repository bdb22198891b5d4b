//! Bookstore catalog application library.
//!
//! Hosts the `books` module (models, query parsing, storage backends, the
//! catalog service and its HTTP routes) and shared utilities.

pub mod modules;
pub mod utils;

pub use modules::register_all;

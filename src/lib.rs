pub mod backend;
pub mod config;
pub mod error;
pub mod history;
pub mod media;
pub mod resolver;
pub mod server;

pub use error::{Error, Result};

pub mod chat;
pub mod config;
pub mod error;
pub mod project;
pub mod thread;

pub use config::Config;
pub use error::*;

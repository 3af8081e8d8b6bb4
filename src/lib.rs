pub mod collectors;
pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod target;

pub use error::{Error, Result};

pub mod config;
pub mod error;
pub mod history;
pub mod level;
pub mod review;
pub mod session;
pub mod store;
pub mod term;
pub mod tutor;
pub mod web;

pub use error::{Error, Result};

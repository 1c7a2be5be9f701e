pub mod audit;
pub mod build;
pub mod config;
pub mod db;
pub mod deploy;
pub mod error;
pub mod guard;
pub mod io;
pub mod pipeline;
pub mod retention;
pub mod runner;

pub use error::{DashError, Result};

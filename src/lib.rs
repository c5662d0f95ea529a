pub mod cli;
pub mod compile;
pub mod fixing;
pub mod infile;
pub mod loader;
pub mod model;
pub mod paths;
pub mod project;

mod api;
mod config;

pub use api::{Wreck, WreckBuilder, WreckError};

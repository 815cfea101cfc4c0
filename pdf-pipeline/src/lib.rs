pub mod cli;
pub mod engine;
pub mod gateway;
pub mod load_config;
pub mod queue;
pub mod storage;

pub use cli::{run, Cli, Commands};

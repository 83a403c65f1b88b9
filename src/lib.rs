pub mod app;
pub mod cli;
pub mod config;
pub mod output;
pub mod probe;
pub mod runner;
pub mod scheduler;
pub mod shared;
pub mod signature;
pub mod utils;

#[cfg(test)]
mod tests;

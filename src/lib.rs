pub mod app;
pub mod browser;
pub mod builder;
pub mod campaign;
pub mod config;
pub mod db;
pub mod errors;
pub mod fallback;
pub mod llm;
pub mod logging;
pub mod poll;
pub mod qa;
pub mod server;

#[cfg(test)]
pub mod testing;

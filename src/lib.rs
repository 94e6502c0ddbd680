pub mod class;
pub mod class_file;
pub mod classpath;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod loader;
pub mod locator;
pub mod output;
pub mod reader;
pub mod request;
pub mod source;

#[cfg(test)]
mod testing;

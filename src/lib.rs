#![forbid(unsafe_code)]

pub mod acquire;
pub mod archive;
pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod manifest;
pub mod pipeline;
pub mod platform;
pub mod release;
pub mod report;
pub mod scanner;
pub mod utils;
pub mod version;
pub mod workspace;

//! MedShop - natural-language questions over a medical inventory database.
//!
//! This library exposes the core modules for the binary and for integration tests.

pub mod chat;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod safety;
pub mod server;

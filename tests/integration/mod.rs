//! Integration tests for MedShop.

pub mod chat_test;
pub mod common;
pub mod pipeline_test;
pub mod server_test;

//! Integration tests for MedShop.
//!
//! Everything runs against in-memory SQLite and the mock LLM, so no external
//! services are needed.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;

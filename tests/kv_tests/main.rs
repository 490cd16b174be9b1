//! Key-value backend tests

#[path = "../common/mod.rs"]
mod common;

mod durable_tests;

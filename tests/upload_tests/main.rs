//! Chunked upload tests

#[path = "../common/mod.rs"]
mod common;

mod assembler_tests;
mod session_tests;

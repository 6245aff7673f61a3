//! Integration tests for vmcore-report
//!
//! These tests drive the public API and the binary end to end.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli_flow;
pub mod engine_flow;
pub mod selection_flow;

//! End-to-end test modules for the winapp CLI
//!
//! These tests use `assert_cmd` and `predicates` to run the binary as a black
//! box against a temporary home and project directory. Only commands that do
//! not need the Windows SDK toolchain are exercised.

pub mod config_tests;
pub mod error_tests;

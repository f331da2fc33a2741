//! Shared test utilities for hcm integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated projects in temp directories
//! - Builder patterns for definition trees and change modules

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{find_module, read_modules, TestHarness};

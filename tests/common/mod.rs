//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Engine and store fixtures on temporary directories
//! - Mock origin helpers for `/punch`, `/vacations` and the app shell
//! - Custom assertion macros

pub mod assertions;
pub mod fixtures;
pub mod mock_server;

// Re-export commonly used utilities
pub use fixtures::*;
pub use mock_server::*;

//! Integration tests
//!
//! End-to-end behaviour of the engine, the sync coordinator and the worker
//! against a mock origin.

mod engine_test;
mod sync_test;

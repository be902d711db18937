//! Property-based tests

mod store_parity_proptest;

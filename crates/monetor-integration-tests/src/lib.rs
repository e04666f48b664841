//! Integration test crate for the moneTor payment substrate.
//!
//! This crate has no library code. It only holds end-to-end flows that
//! cross the types, crypto, onion and payment crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p monetor-integration-tests
//! ```

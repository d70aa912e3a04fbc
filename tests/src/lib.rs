//! # Token-Registry Test Suite
//!
//! Cross-crate flows running the real batch client, resolver and registry
//! manager over in-process transports.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs       # token id -> identity through every layer
//!     └── connection.rs  # client lifecycle driving the registry
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bcmr-tests
//! cargo test -p bcmr-tests integration::connection::
//! ```

pub mod integration;

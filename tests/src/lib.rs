//! Integration tests for chordal rings.
//!
//! The harness lives in `integration`; scenario tests are under `tests/`.

pub mod integration;

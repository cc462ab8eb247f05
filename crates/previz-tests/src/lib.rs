//! Integration test crate for Previz.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the engine and session crates to verify the DAG,
//! rewrite engine, cache, and session driver work together.

#[cfg(test)]
mod identity;

#[cfg(test)]
mod rewrite;

#[cfg(test)]
mod caching;

#[cfg(test)]
mod session;

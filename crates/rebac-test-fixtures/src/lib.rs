//! Test fixtures for ReBAC integration tests
//!
//! Shared helpers for building tuples and namespaces, plus the proptest
//! configuration used across suites.

#![deny(unsafe_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod proptest_config;
pub mod relationships;

pub use relationships::{
    computed, delete, direct_namespace, namespace, relation, touch, tuple, tuple_to_userset,
};

//! Shared proptest configuration for the ReBAC test suites.
//!
//! The `PROPTEST_CASES` environment variable overrides the default case count:
//!
//! ```bash
//! PROPTEST_CASES=500 cargo test
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use rebac_test_fixtures::proptest_config::proptest_config;
//! use proptest::prelude::*;
//! use proptest::test_runner::TestRunner;
//!
//! let strategy = any::<u32>();
//! let mut runner = TestRunner::new(proptest_config());
//! runner.run(&strategy, |_input| Ok(())).expect("proptest failed");
//! ```

use proptest::test_runner::Config as ProptestConfig;

/// Case count used when `PROPTEST_CASES` is unset
pub const DEFAULT_PROPTEST_CASES: u32 = 50;

/// Returns the number of test cases to run, reading `PROPTEST_CASES` if set.
#[must_use]
pub fn test_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES)
}

/// Returns a proptest configuration with the appropriate number of test cases.
#[must_use]
pub fn proptest_config() -> ProptestConfig {
    ProptestConfig::with_cases(test_cases())
}

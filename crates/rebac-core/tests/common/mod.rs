//! Helper utilities for integration tests

#![allow(dead_code)]

use rebac_core::{CheckRequest, CheckResult, Consistency, Model};
use rebac_test_fixtures::touch;
use rebac_types::{Decision, Revision};

/// Test fixture for setting up a complete evaluation environment
pub struct TestFixture {
    pub model: Model,
}

impl TestFixture {
    /// Create a new test fixture with the given schema document
    pub async fn new(schema: &str) -> Self {
        let model = Model::in_memory();
        model.write_schema(schema).await.unwrap();
        Self { model }
    }

    /// Write tuples given in their textual form
    pub async fn write_tuples(&self, tuples: &[&str]) -> anyhow::Result<Revision> {
        let updates = tuples.iter().map(|t| touch(t)).collect();
        Ok(self.model.write_tuples(updates).await?)
    }

    /// Perform a check at the newest revision
    pub async fn check(
        &self,
        object: &str,
        relation: &str,
        subject: &str,
    ) -> anyhow::Result<CheckResult> {
        self.check_with_depth(object, relation, subject, None).await
    }

    pub async fn check_with_depth(
        &self,
        object: &str,
        relation: &str,
        subject: &str,
        depth: Option<u32>,
    ) -> anyhow::Result<CheckResult> {
        let mut request = CheckRequest::new(object.parse()?, relation, subject.parse()?);
        request.depth = depth;
        Ok(self.model.check(&request, Consistency::FullyConsistent).await?)
    }

    /// Assert that a check returns Allow
    pub async fn assert_allowed(&self, object: &str, relation: &str, subject: &str) {
        let result = self.check(object, relation, subject).await.unwrap();
        assert_eq!(
            result.decision,
            Decision::Allow,
            "{} should have {} on {}",
            subject,
            relation,
            object
        );
    }

    /// Assert that a check returns Deny
    pub async fn assert_denied(&self, object: &str, relation: &str, subject: &str) {
        let result = self.check(object, relation, subject).await.unwrap();
        assert_eq!(
            result.decision,
            Decision::Deny,
            "{} should not have {} on {}",
            subject,
            relation,
            object
        );
    }
}

//! Check and expand entry points
//!
//! The [`Evaluator`] holds only engine settings. The store and namespace
//! cache are passed to every call, so one evaluator can serve any number of
//! stores.

use std::future::Future;
use std::time::{Duration, Instant};

use rebac_cache::NamespaceCache;
use rebac_config::EngineConfig;
use rebac_store::TupleStore;
use rebac_types::{Decision, Revision};
use tracing::{debug, instrument, warn, Instrument};

use crate::graph::{GraphContext, Membership, OnMissing};
use crate::{CheckRequest, CheckResult, EvalError, ExpandRequest, ExpandResult, Result};

mod check;
mod expand;

/// Recursion budget used when none is configured
pub const DEFAULT_MAX_DEPTH: u32 = 50;

/// Sibling sub-dispatches evaluated at once when none is configured
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 10;

#[derive(Debug, Clone)]
pub struct Evaluator {
    max_depth: u32,
    dispatch_concurrency: usize,
    timeout: Option<Duration>,
}

impl Evaluator {
    pub fn new(max_depth: u32, dispatch_concurrency: usize) -> Self {
        Self { max_depth, dispatch_concurrency: dispatch_concurrency.max(1), timeout: None }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let evaluator = Self::new(config.max_depth, config.dispatch_concurrency);
        match config.check_timeout() {
            Some(timeout) => evaluator.with_timeout(timeout),
            None => evaluator,
        }
    }

    /// Abort checks and expands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The requested depth clamped to the configured maximum
    pub fn effective_depth(&self, requested: Option<u32>) -> u32 {
        requested.map_or(self.max_depth, |depth| depth.min(self.max_depth))
    }

    /// Check if a subject has a relation on an object at `revision`
    ///
    /// Running out of recursion depth is not an error: the decision is
    /// `Deny` and [`CheckResult::depth_exceeded`] is set.
    pub async fn check(
        &self,
        store: &dyn TupleStore,
        namespaces: &NamespaceCache,
        request: &CheckRequest,
        revision: Revision,
    ) -> Result<CheckResult> {
        let span = rebac_observe::span_utils::check_span(
            &request.subject.to_string(),
            &request.object.to_string(),
            &request.relation,
        );
        let start = Instant::now();

        let result = self
            .run_check(store, namespaces, request, revision)
            .instrument(span.clone())
            .await;

        match &result {
            Ok(checked) => {
                span.record("decision", checked.decision.as_str());
                rebac_observe::metrics::record_check(
                    checked.decision.as_str(),
                    start.elapsed().as_secs_f64(),
                );
            },
            Err(e) => rebac_observe::metrics::record_check_error(e.kind()),
        }

        result
    }

    /// Like [`Evaluator::check`], but depth exhaustion is an error
    pub async fn check_strict(
        &self,
        store: &dyn TupleStore,
        namespaces: &NamespaceCache,
        request: &CheckRequest,
        revision: Revision,
    ) -> Result<Decision> {
        let result = self.check(store, namespaces, request, revision).await?;
        if result.depth_exceeded {
            return Err(EvalError::DepthExceeded(self.effective_depth(request.depth)));
        }
        Ok(result.decision)
    }

    async fn run_check(
        &self,
        store: &dyn TupleStore,
        namespaces: &NamespaceCache,
        request: &CheckRequest,
        revision: Revision,
    ) -> Result<CheckResult> {
        debug!(
            subject = %request.subject,
            object = %request.object,
            relation = %request.relation,
            revision = %revision,
            "Evaluating permission check"
        );

        store.check_revision(revision).await?;

        let depth = self.effective_depth(request.depth);
        let ctx = GraphContext::new(store, namespaces, revision, self.dispatch_concurrency);

        let membership = self
            .within_timeout(check::dispatch(
                &ctx,
                &request.object,
                &request.relation,
                &request.subject,
                depth,
                OnMissing::Fail,
                "check",
            ))
            .await?;

        let depth_exceeded = membership == Membership::Indeterminate;
        if depth_exceeded {
            warn!(
                subject = %request.subject,
                object = %request.object,
                relation = %request.relation,
                depth,
                "Recursion depth exhausted, denying"
            );
            rebac_observe::metrics::record_depth_exceeded(
                &request.object.namespace,
                &request.relation,
            );
        }

        let decision = Decision::from(membership == Membership::Member);
        debug!(
            decision = decision.as_str(),
            dispatches = ctx.dispatch_count(),
            "Permission check complete"
        );

        Ok(CheckResult {
            decision,
            revision,
            depth_exceeded,
            dispatch_count: ctx.dispatch_count(),
        })
    }

    /// Expand a relation on an object into its userset tree at `revision`
    #[instrument(
        skip(self, store, namespaces, request),
        fields(object = %request.object, relation = %request.relation)
    )]
    pub async fn expand(
        &self,
        store: &dyn TupleStore,
        namespaces: &NamespaceCache,
        request: &ExpandRequest,
        revision: Revision,
    ) -> Result<ExpandResult> {
        let start = Instant::now();
        store.check_revision(revision).await?;

        let depth = self.effective_depth(request.depth);
        let ctx = GraphContext::new(store, namespaces, revision, self.dispatch_concurrency);

        let tree = self
            .within_timeout(expand::expand_dispatch(
                &ctx,
                &request.object,
                &request.relation,
                depth,
                OnMissing::Fail,
            ))
            .await?;

        let resolved = tree.resolve();
        let subjects = resolved
            .definite
            .as_finite()
            .ok_or_else(|| EvalError::Internal("expand produced an unbounded subject set".into()))?
            .iter()
            .cloned()
            .collect();
        let truncated = tree.is_truncated();

        rebac_observe::metrics::record_expand(start.elapsed().as_secs_f64(), truncated);
        debug!(truncated, "Expand complete");

        Ok(ExpandResult { tree, subjects, revision, truncated })
    }

    async fn within_timeout<T>(&self, evaluation: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, evaluation)
                .await
                .map_err(|_| EvalError::Timeout(timeout))?,
            None => evaluation.await,
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_DISPATCH_CONCURRENCY)
    }
}

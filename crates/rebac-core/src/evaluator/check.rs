//! Recursive check dispatch
//!
//! Each rewrite operator maps onto three-valued membership. Sibling
//! branches run concurrently up to the context's limit, and a union stops
//! at its first member (an intersection at its first non-member), dropping
//! the branches still in flight.

use std::collections::BTreeSet;

use async_recursion::async_recursion;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use rebac_types::{ObjectRef, RelationExpr, Subject};
use tracing::{debug, Instrument};

use crate::graph::{GraphContext, Membership, OnMissing};
use crate::Result;

/// Decide whether `subject` has `relation` on `object` with `depth` hops left
///
/// `via` names the operator that caused this dispatch, for metrics.
#[async_recursion]
pub(crate) async fn dispatch<'a>(
    ctx: &'a GraphContext<'a>,
    object: &'a ObjectRef,
    relation: &'a str,
    subject: &'a Subject,
    depth: u32,
    on_missing: OnMissing,
    via: &'static str,
) -> Result<Membership> {
    if depth == 0 {
        debug!(object = %object, relation, "Recursion depth exhausted");
        return Ok(Membership::Indeterminate);
    }

    let key = (object.clone(), relation.to_string(), subject.clone(), depth);
    if let Some(membership) = ctx.memoized(&key).await {
        rebac_observe::metrics::record_dispatch_memo_hit();
        return Ok(membership);
    }

    let Some(resolved) = ctx.resolve_relation(object, relation, on_missing).await? else {
        debug!(object = %object, relation, "Unresolvable branch, treating as empty");
        return Ok(Membership::NotMember);
    };
    let rewrite = resolved.definition()?.rewrite_or_this();

    ctx.record_dispatch(via);
    let span = rebac_observe::span_utils::dispatch_span(&object.to_string(), relation, depth);
    let membership = eval_expr(ctx, object, relation, rewrite, subject, depth)
        .instrument(span.clone())
        .await?;
    span.record("membership", membership.as_str());

    ctx.memoize(key, membership).await;
    Ok(membership)
}

#[async_recursion]
async fn eval_expr<'a>(
    ctx: &'a GraphContext<'a>,
    object: &'a ObjectRef,
    relation: &'a str,
    expr: &'a RelationExpr,
    subject: &'a Subject,
    depth: u32,
) -> Result<Membership> {
    match expr {
        RelationExpr::This => eval_this(ctx, object, relation, subject, depth).await,

        RelationExpr::ComputedUserset { relation: computed } => {
            dispatch(
                ctx,
                object,
                computed,
                subject,
                depth.saturating_sub(1),
                OnMissing::Fail,
                "computed_userset",
            )
            .await
        },

        RelationExpr::TupleToUserset { tupleset, computed } => {
            let tuples = ctx.read_tuples(object, tupleset).await?;
            // The subject relation of a tupleset tuple is ignored
            let targets: BTreeSet<ObjectRef> =
                tuples.iter().map(|tuple| tuple.subject.object()).collect();

            let branches: Vec<BoxFuture<'_, Result<Membership>>> = targets
                .iter()
                .map(|target| {
                    dispatch(
                        ctx,
                        target,
                        computed,
                        subject,
                        depth.saturating_sub(1),
                        OnMissing::Deny,
                        "tuple_to_userset",
                    )
                })
                .collect();
            any_member(branches, ctx.concurrency).await
        },

        RelationExpr::Union(children) => {
            let branches: Vec<BoxFuture<'_, Result<Membership>>> = children
                .iter()
                .map(|child| eval_expr(ctx, object, relation, child, subject, depth))
                .collect();
            any_member(branches, ctx.concurrency).await
        },

        RelationExpr::Intersection(children) => {
            if children.is_empty() {
                return Ok(Membership::NotMember);
            }
            let branches: Vec<BoxFuture<'_, Result<Membership>>> = children
                .iter()
                .map(|child| eval_expr(ctx, object, relation, child, subject, depth))
                .collect();
            all_members(branches, ctx.concurrency).await
        },

        RelationExpr::Exclusion { base, subtract } => {
            let base = eval_expr(ctx, object, relation, base, subject, depth).await?;
            if base == Membership::NotMember {
                return Ok(Membership::NotMember);
            }
            let subtract = eval_expr(ctx, object, relation, subtract, subject, depth).await?;
            Ok(base.and(subtract.not()))
        },
    }
}

/// Direct tuples, then the usersets named by them
async fn eval_this<'a>(
    ctx: &'a GraphContext<'a>,
    object: &'a ObjectRef,
    relation: &'a str,
    subject: &'a Subject,
    depth: u32,
) -> Result<Membership> {
    let tuples = ctx.read_tuples(object, relation).await?;

    if tuples.iter().any(|tuple| &tuple.subject == subject) {
        return Ok(Membership::Member);
    }

    let usersets: BTreeSet<(ObjectRef, &str)> = tuples
        .iter()
        .filter_map(|tuple| {
            let userset_relation = tuple.subject.relation.as_deref()?;
            Some((tuple.subject.object(), userset_relation))
        })
        .collect();

    let branches: Vec<BoxFuture<'_, Result<Membership>>> = usersets
        .iter()
        .map(|(userset, userset_relation)| {
            dispatch(
                ctx,
                userset,
                userset_relation,
                subject,
                depth.saturating_sub(1),
                OnMissing::Fail,
                "this_userset",
            )
        })
        .collect();
    any_member(branches, ctx.concurrency).await
}

/// Kleene OR over `branches`, stopping at the first member
async fn any_member(
    branches: Vec<BoxFuture<'_, Result<Membership>>>,
    limit: usize,
) -> Result<Membership> {
    let mut pending = stream::iter(branches).buffer_unordered(limit);
    let mut result = Membership::NotMember;

    while let Some(branch) = pending.next().await {
        result = result.or(branch?);
        if result == Membership::Member {
            break;
        }
    }

    Ok(result)
}

/// Kleene AND over `branches`, stopping at the first non-member
async fn all_members(
    branches: Vec<BoxFuture<'_, Result<Membership>>>,
    limit: usize,
) -> Result<Membership> {
    let mut pending = stream::iter(branches).buffer_unordered(limit);
    let mut result = Membership::Member;

    while let Some(branch) = pending.next().await {
        result = result.and(branch?);
        if result == Membership::NotMember {
            break;
        }
    }

    Ok(result)
}

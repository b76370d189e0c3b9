//! Userset tree expansion
//!
//! Walks the same rewrite rules as check dispatch, but collects the subjects
//! each branch contributes instead of testing one subject. Branches that run
//! out of depth become `Truncated` nodes.

use std::collections::BTreeSet;

use async_recursion::async_recursion;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use rebac_types::{ObjectRef, RelationExpr};
use tracing::debug;

use crate::graph::{GraphContext, OnMissing};
use crate::types::{UsersetNodeType, UsersetTree};
use crate::Result;

#[async_recursion]
pub(crate) async fn expand_dispatch<'a>(
    ctx: &'a GraphContext<'a>,
    object: &'a ObjectRef,
    relation: &'a str,
    depth: u32,
    on_missing: OnMissing,
) -> Result<UsersetTree> {
    if depth == 0 {
        debug!(object = %object, relation, "Expansion truncated");
        return Ok(UsersetTree::node(
            UsersetNodeType::Truncated { object: object.clone(), relation: relation.to_string() },
            vec![],
        ));
    }

    let Some(resolved) = ctx.resolve_relation(object, relation, on_missing).await? else {
        return Ok(UsersetTree::leaf(vec![]));
    };
    let rewrite = resolved.definition()?.rewrite_or_this();

    ctx.record_dispatch("expand");
    expand_expr(ctx, object, relation, rewrite, depth).await
}

#[async_recursion]
async fn expand_expr<'a>(
    ctx: &'a GraphContext<'a>,
    object: &'a ObjectRef,
    relation: &'a str,
    expr: &'a RelationExpr,
    depth: u32,
) -> Result<UsersetTree> {
    match expr {
        RelationExpr::This => {
            let tuples = ctx.read_tuples(object, relation).await?;

            let usersets: BTreeSet<(ObjectRef, &str)> = tuples
                .iter()
                .filter_map(|tuple| {
                    let userset_relation = tuple.subject.relation.as_deref()?;
                    Some((tuple.subject.object(), userset_relation))
                })
                .collect();
            let nested: Vec<BoxFuture<'_, Result<UsersetTree>>> = usersets
                .iter()
                .map(|(userset, userset_relation)| {
                    expand_dispatch(
                        ctx,
                        userset,
                        userset_relation,
                        depth.saturating_sub(1),
                        OnMissing::Fail,
                    )
                })
                .collect();

            let mut children =
                vec![UsersetTree::leaf(tuples.iter().map(|tuple| tuple.subject.clone()).collect())];
            children.extend(collect_ordered(nested, ctx.concurrency).await?);

            Ok(UsersetTree::node(
                UsersetNodeType::This { object: object.clone(), relation: relation.to_string() },
                children,
            ))
        },

        RelationExpr::ComputedUserset { relation: computed } => {
            let child =
                expand_dispatch(ctx, object, computed, depth.saturating_sub(1), OnMissing::Fail)
                    .await?;
            Ok(UsersetTree::node(
                UsersetNodeType::ComputedUserset { relation: computed.clone() },
                vec![child],
            ))
        },

        RelationExpr::TupleToUserset { tupleset, computed } => {
            let tuples = ctx.read_tuples(object, tupleset).await?;
            let targets: BTreeSet<ObjectRef> =
                tuples.iter().map(|tuple| tuple.subject.object()).collect();

            let branches: Vec<BoxFuture<'_, Result<UsersetTree>>> = targets
                .iter()
                .map(|target| {
                    expand_dispatch(ctx, target, computed, depth.saturating_sub(1), OnMissing::Deny)
                })
                .collect();

            Ok(UsersetTree::node(
                UsersetNodeType::TupleToUserset {
                    tupleset: tupleset.clone(),
                    computed: computed.clone(),
                },
                collect_ordered(branches, ctx.concurrency).await?,
            ))
        },

        RelationExpr::Union(children) => {
            let branches: Vec<BoxFuture<'_, Result<UsersetTree>>> = children
                .iter()
                .map(|child| expand_expr(ctx, object, relation, child, depth))
                .collect();
            Ok(UsersetTree::node(
                UsersetNodeType::Union,
                collect_ordered(branches, ctx.concurrency).await?,
            ))
        },

        RelationExpr::Intersection(children) => {
            let branches: Vec<BoxFuture<'_, Result<UsersetTree>>> = children
                .iter()
                .map(|child| expand_expr(ctx, object, relation, child, depth))
                .collect();
            Ok(UsersetTree::node(
                UsersetNodeType::Intersection,
                collect_ordered(branches, ctx.concurrency).await?,
            ))
        },

        RelationExpr::Exclusion { base, subtract } => {
            let base = expand_expr(ctx, object, relation, base, depth).await?;
            // Nothing to subtract from a base that is empty for every subject
            let subtract = if base.resolve().possible.as_finite().is_some_and(|s| s.is_empty()) {
                UsersetTree::leaf(Vec::new())
            } else {
                expand_expr(ctx, object, relation, subtract, depth).await?
            };
            Ok(UsersetTree::node(UsersetNodeType::Exclusion, vec![base, subtract]))
        },
    }
}

/// Run `branches` concurrently, keeping their order in the result
async fn collect_ordered(
    branches: Vec<BoxFuture<'_, Result<UsersetTree>>>,
    limit: usize,
) -> Result<Vec<UsersetTree>> {
    stream::iter(branches).buffered(limit).try_collect().await
}

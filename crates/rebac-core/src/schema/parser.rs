//! Schema parser implementation using pest

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use rebac_types::{NamespaceDefinition, RelationDef, RelationExpr};

use crate::{EvalError, Result};

#[derive(Parser)]
#[grammar = "schema.pest"]
pub struct SchemaParser;

/// Parse a schema document into namespace definitions
///
/// Only syntax is checked here; see [`super::validate_schema`] for
/// reference checks.
pub fn parse_schema(source: &str) -> Result<Vec<NamespaceDefinition>> {
    let pairs = SchemaParser::parse(Rule::schema, source)
        .map_err(|e| EvalError::Parse(format!("Parse error: {}", e)))?;

    let mut namespaces = Vec::new();

    for pair in pairs {
        match pair.as_rule() {
            Rule::schema => {
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::namespace_def => namespaces.push(parse_namespace_def(inner)?),
                        Rule::EOI => {},
                        other => return Err(unexpected(other)),
                    }
                }
            },
            other => return Err(unexpected(other)),
        }
    }

    Ok(namespaces)
}

fn unexpected(rule: Rule) -> EvalError {
    EvalError::Parse(format!("Unexpected rule: {:?}", rule))
}

fn next_identifier(inner: &mut pest::iterators::Pairs<Rule>, what: &str) -> Result<String> {
    inner
        .next()
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| EvalError::Parse(format!("Expected {}", what)))
}

fn parse_namespace_def(pair: Pair<Rule>) -> Result<NamespaceDefinition> {
    let mut inner = pair.into_inner();
    let name = next_identifier(&mut inner, "namespace name")?;

    let relations = inner.map(parse_relation_def).collect::<Result<Vec<_>>>()?;

    Ok(NamespaceDefinition::new(name, relations))
}

fn parse_relation_def(pair: Pair<Rule>) -> Result<RelationDef> {
    let mut inner = pair.into_inner();
    let name = next_identifier(&mut inner, "relation name")?;

    let rewrite = inner.next().map(parse_relation_expr).transpose()?;

    Ok(RelationDef::new(name, rewrite))
}

fn parse_relation_expr(pair: Pair<Rule>) -> Result<RelationExpr> {
    match pair.as_rule() {
        Rule::relation_expr => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| EvalError::Parse("Expected expression".to_string()))?;
            parse_relation_expr(inner)
        },
        Rule::union_expr => {
            let exprs = parse_operands(pair)?;
            Ok(collapse(exprs, RelationExpr::Union))
        },
        Rule::intersection_expr => {
            let exprs = parse_operands(pair)?;
            Ok(collapse(exprs, RelationExpr::Intersection))
        },
        Rule::exclusion_expr => parse_exclusion_expr(pair),
        Rule::primary_expr => parse_primary_expr(pair),
        other => Err(unexpected(other)),
    }
}

fn parse_operands(pair: Pair<Rule>) -> Result<Vec<RelationExpr>> {
    pair.into_inner().map(parse_relation_expr).collect()
}

/// A single operand stands for itself rather than a one-element set
fn collapse(mut exprs: Vec<RelationExpr>, op: fn(Vec<RelationExpr>) -> RelationExpr) -> RelationExpr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        op(exprs)
    }
}

/// `a - b - c` reads as `(a - b) - c`
fn parse_exclusion_expr(pair: Pair<Rule>) -> Result<RelationExpr> {
    let mut operands = pair.into_inner().map(parse_primary_expr);

    let base = operands
        .next()
        .ok_or_else(|| EvalError::Parse("Expected base expression".to_string()))??;

    operands.try_fold(base, |base, subtract| Ok(RelationExpr::exclusion(base, subtract?)))
}

fn parse_primary_expr(pair: Pair<Rule>) -> Result<RelationExpr> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| EvalError::Parse("Expected primary expression".to_string()))?;

    match inner.as_rule() {
        Rule::this_ref => Ok(RelationExpr::This),
        Rule::computed_userset => {
            let mut parts = inner.into_inner();
            Ok(RelationExpr::computed(next_identifier(&mut parts, "relation name")?))
        },
        Rule::tuple_to_userset => {
            let mut parts = inner.into_inner();
            let tupleset = next_identifier(&mut parts, "tupleset relation")?;
            let computed = next_identifier(&mut parts, "computed relation")?;
            Ok(RelationExpr::tuple_to_userset(tupleset, computed))
        },
        Rule::relation_expr => parse_relation_expr(inner),
        other => Err(unexpected(other)),
    }
}

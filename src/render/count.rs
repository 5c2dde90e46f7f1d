//! Count query projection and join pruning.

use std::collections::BTreeSet;

use crate::error::{QueryError, QueryResult};
use crate::join::{JoinId, JoinOrigin, JoinType, ScopeId};
use crate::query::QueryModel;
use crate::sql::expr::Expr;
use crate::sql::token::TokenStream;

use super::RenderContext;

/// `COUNT(*)`, or a distinct count over the GROUP BY items.
pub fn count_projection(group_by: &[Expr], ctx: &RenderContext<'_>) -> QueryResult<TokenStream> {
    let counted = match group_by {
        [] => Expr::function("COUNT", vec![Expr::Star]),
        [single] => Expr::Function {
            name: "COUNT".into(),
            args: vec![single.clone()],
            distinct: true,
        },
        many => {
            if !ctx.capabilities().supports_count_tuple {
                return Err(QueryError::unsupported(
                    format!("distinct count over {} GROUP BY items", many.len()),
                    ctx.dialect(),
                ));
            }
            let mut args = vec![Expr::string("DISTINCT")];
            args.extend(many.iter().cloned());
            Expr::function("COUNT_TUPLE", args)
        }
    };
    Ok(counted.to_tokens(ctx))
}

/// Joins of the main scope a count query keeps: those the WHERE, GROUP BY
/// and HAVING clauses read, explicit INNER joins and entity joins, with
/// everything they depend on.
pub fn count_joins(model: &QueryModel, ctx: &RenderContext<'_>, group_by: &[Expr]) -> BTreeSet<JoinId> {
    let graph = ctx.graph();
    let mut seeds = BTreeSet::new();
    for expr in model.where_clause.iter().chain(&model.having).chain(group_by) {
        seeds.extend(expr.referenced_joins(graph));
    }
    seeds.extend(
        graph
            .nodes()
            .iter()
            .filter(|node| node.scope == ScopeId::MAIN)
            .filter(|node| match node.origin {
                JoinOrigin::Entity => true,
                JoinOrigin::Explicit => node.join_type == JoinType::Inner,
                _ => false,
            })
            .map(|node| node.id),
    );
    let kept = ctx.dependency_closure(seeds);
    log::debug!(
        "count query keeps {} of {} joins",
        kept.iter().filter(|id| !graph.node(**id).origin.is_root()).count(),
        graph.joins(ScopeId::MAIN).len()
    );
    kept
}

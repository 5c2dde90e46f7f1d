//! Implicit GROUP BY inference.

use std::collections::HashSet;

use crate::config::{FunctionRegistry, QueryConfig};
use crate::metadata::Metamodel;
use crate::query::{QueryModel, StatementKind};
use crate::sql::expr::Expr;

use super::RenderContext;

/// Whether `expr` aggregates rows outside of subqueries and windows.
pub fn contains_aggregate(expr: &Expr, functions: &FunctionRegistry) -> bool {
    match expr {
        Expr::SizeCount(_) => true,
        Expr::Function { name, args, .. } => {
            functions.is_aggregate(name) || args.iter().any(|a| contains_aggregate(a, functions))
        }
        Expr::Exists { .. } | Expr::Subquery(_) | Expr::Window { .. } => false,
        other => other
            .children()
            .into_iter()
            .any(|child| contains_aggregate(child, functions)),
    }
}

/// Attribute leaves of `expr` that are not under an aggregate.
fn non_aggregated_leaves(expr: &Expr, functions: &FunctionRegistry, out: &mut Vec<Expr>) {
    match expr {
        Expr::Attribute(_) => out.push(expr.clone()),
        Expr::SizeCount(_) | Expr::Exists { .. } | Expr::Subquery(_) | Expr::Window { .. } => {}
        Expr::Function { name, .. } if functions.is_aggregate(name) => {}
        other => {
            for child in other.children() {
                non_aggregated_leaves(child, functions, out);
            }
        }
    }
}

/// Whether `expr` reads any attribute of the outer query.
fn references_attributes(expr: &Expr) -> bool {
    let mut leaves = Vec::new();
    non_aggregated_leaves(expr, &FunctionRegistry::default(), &mut leaves);
    !leaves.is_empty()
}

/// The GROUP BY items of a statement: the explicit ones, extended by the
/// non-aggregated fragments of an aggregating SELECT list.
pub fn group_by_items(
    model: &QueryModel,
    metamodel: &dyn Metamodel,
    config: &QueryConfig,
    ctx: &RenderContext<'_>,
) -> Vec<Expr> {
    let mut items: Vec<Expr> = model.group_by.iter().map(|g| g.expr.clone()).collect();
    let functions = &config.functions;
    let aggregating = model
        .select
        .iter()
        .any(|item| contains_aggregate(&item.expr.expr, functions));

    if model.kind == StatementKind::Select && config.implicit_group_by && aggregating {
        for item in &model.select {
            item.expr.expr.walk(&mut |e| {
                if let Expr::SizeCount(size) = e {
                    let owner = ctx.graph().node(size.owner);
                    items.push(match metamodel.id_attribute(&owner.entity_type) {
                        Some(id) => Expr::attr(size.owner, vec![id]),
                        None => Expr::alias(size.owner),
                    });
                }
            });
        }
        for item in &model.select {
            let expr = &item.expr.expr;
            if contains_aggregate(expr, functions) {
                non_aggregated_leaves(expr, functions, &mut items);
            } else if !item.expansion.is_empty() {
                items.extend(item.expansion.iter().cloned());
            } else if references_attributes(expr) {
                items.push(expr.clone());
            }
        }
        for order in model.order_by.iter().filter(|o| o.select_alias.is_none()) {
            let expr = &order.expr.expr;
            if contains_aggregate(expr, functions) {
                non_aggregated_leaves(expr, functions, &mut items);
            } else if references_attributes(expr) {
                items.push(expr.clone());
            }
        }
        log::debug!("inferred {} GROUP BY items", items.len());
    }

    let mut seen = HashSet::new();
    items.retain(|e| seen.insert(ctx.render(e)));
    items
}

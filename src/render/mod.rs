//! Statement rendering.
//!
//! Rendering is a pure read of a [`QueryModel`]: the same model always
//! yields the same text. [`QueryRenderer`] produces the object query, the
//! count queries and their paginated variants; CTEs are emitted ahead of
//! the main statement in declaration order.

pub mod context;
pub mod count;
pub mod group_by;

pub use context::RenderContext;

use serde::Serialize;
use serde_json::Value;

use crate::cache::compute_hash;
use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use crate::join::{JoinId, ScopeId};
use crate::keyset::{self, KeysetKey, KeysetMode, KeysetPage};
use crate::metadata::Metamodel;
use crate::query::{OrderItem, Parameters, QueryModel, StatementKind};
use crate::sql::expr::Expr;
use crate::sql::token::{Token, TokenStream};

/// A rendered statement with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub text: String,
    /// Parameters in order of first occurrence in `text`.
    pub parameters: Vec<BoundParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParameter {
    pub name: String,
    /// None for parameters the caller has not set yet.
    pub value: Option<Value>,
}

impl Statement {
    /// SHA-256 over text and parameters.
    pub fn cache_key(&self) -> Result<String, serde_json::Error> {
        compute_hash(self)
    }

    pub fn parameter(&self, name: &str) -> Option<&BoundParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// The statements of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedStatements {
    pub object: Statement,
    pub count: Statement,
    pub root_count: Statement,
    /// Set when the page was fetched by keyset.
    pub keyset_mode: Option<KeysetMode>,
    /// The object query orders in reverse; the caller reverses the rows.
    pub reversed: bool,
}

#[derive(Debug, Clone, Default)]
struct BodyOptions {
    keyset: Option<Expr>,
    reverse_order: bool,
    limit: Option<u64>,
    offset: Option<u64>,
}

fn offset(first_result: u64) -> Option<u64> {
    (first_result > 0).then_some(first_result)
}

pub struct QueryRenderer<'a> {
    model: &'a QueryModel,
    config: &'a QueryConfig,
    metamodel: &'a dyn Metamodel,
    params: &'a Parameters,
}

impl<'a> QueryRenderer<'a> {
    pub fn new(
        model: &'a QueryModel,
        config: &'a QueryConfig,
        metamodel: &'a dyn Metamodel,
        params: &'a Parameters,
    ) -> Self {
        Self {
            model,
            config,
            metamodel,
            params,
        }
    }

    fn context(&self, model: &'a QueryModel) -> RenderContext<'a> {
        RenderContext::new(&model.graph, self.config)
    }

    fn finish(&self, mut ts: TokenStream, bindings: &[(String, Value)]) -> QueryResult<Statement> {
        let mut full = self.cte_tokens()?;
        full.append(&ts);
        ts = full;
        let parameters = ts
            .parameter_names()
            .into_iter()
            .map(|name| {
                let value = bindings
                    .iter()
                    .find(|(bound, _)| *bound == name)
                    .map(|(_, v)| v.clone())
                    .or_else(|| self.params.get(&name).cloned());
                BoundParameter { name, value }
            })
            .collect();
        let text = ts.serialize(self.config.dialect);
        log::trace!("rendered statement: {}", text);
        Ok(Statement { text, parameters })
    }

    // =========================================================================
    // Public statements
    // =========================================================================

    /// The statement, bounded by the model's first/max results.
    pub fn object(&self) -> QueryResult<Statement> {
        let options = BodyOptions {
            limit: self.model.max_results,
            offset: offset(self.model.first_result),
            ..Default::default()
        };
        let ts = self.statement_tokens(self.model, &options)?;
        self.finish(ts, &[])
    }

    /// `SELECT COUNT(...)` with the joins the filters need.
    pub fn count(&self) -> QueryResult<Statement> {
        let model = self.model;
        self.ensure_countable(model)?;
        let ctx = self.context(model);
        let group_by = group_by::group_by_items(model, self.metamodel, self.config, &ctx);
        let projection = count::count_projection(&group_by, &ctx)?;
        let kept = count::count_joins(model, &ctx, &group_by);
        let ts = self.count_tokens(model, &ctx, projection, |id| kept.contains(&id))?;
        self.finish(ts, &[])
    }

    /// `SELECT COUNT(DISTINCT root.id)` with the joins the filters need.
    pub fn root_count(&self) -> QueryResult<Statement> {
        let model = self.model;
        self.ensure_countable(model)?;
        let ctx = self.context(model);
        let root = first_root(model)?;
        let node = ctx.graph().node(root);
        let id = self
            .metamodel
            .id_attribute(&node.entity_type)
            .ok_or_else(|| {
                QueryError::InvalidArgument(format!(
                    "root '{}' of type {} has no id attribute",
                    node.alias, node.entity_type
                ))
            })?;
        let counted = Expr::Function {
            name: "COUNT".into(),
            args: vec![Expr::attr(root, vec![id])],
            distinct: true,
        };
        let kept = count::count_joins(model, &ctx, &[]);
        let ts = self.count_tokens(model, &ctx, counted.to_tokens(&ctx), |id| kept.contains(&id))?;
        self.finish(ts, &[])
    }

    /// Offset pagination.
    pub fn page(&self, first_result: u64, max_results: u64) -> QueryResult<PaginatedStatements> {
        let options = BodyOptions {
            limit: Some(max_results),
            offset: offset(first_result),
            ..Default::default()
        };
        let object = self.finish(self.statement_tokens(self.model, &options)?, &[])?;
        Ok(PaginatedStatements {
            object,
            count: self.count()?,
            root_count: self.root_count()?,
            keyset_mode: None,
            reversed: false,
        })
    }

    /// Keyset pagination relative to `previous`; falls back to offset
    /// pagination when the requested page is not adjacent.
    pub fn page_keyset(
        &self,
        previous: &KeysetPage,
        first_result: u64,
        max_results: u64,
    ) -> QueryResult<PaginatedStatements> {
        let keys = self.keyset_keys()?;
        let Some((mode, keyset)) = keyset::keyset_mode(previous, first_result, max_results, keys.len()) else {
            log::debug!(
                "page at {} is not adjacent to the keyset page at {}, using offset pagination",
                first_result,
                previous.first_result
            );
            return self.page(first_result, max_results);
        };
        log::debug!("keyset pagination in {:?} mode", mode);
        let predicate = keyset::keyset_predicate(&keys, keyset, mode, self.config);
        let reversed = mode == KeysetMode::Previous;
        let options = BodyOptions {
            keyset: Some(predicate.predicate),
            reverse_order: reversed,
            limit: Some(max_results),
            offset: None,
        };
        let object = self.finish(self.statement_tokens(self.model, &options)?, &predicate.bindings)?;
        Ok(PaginatedStatements {
            object,
            count: self.count()?,
            root_count: self.root_count()?,
            keyset_mode: Some(mode),
            reversed,
        })
    }

    fn keyset_keys(&self) -> QueryResult<Vec<KeysetKey>> {
        if self.model.order_by.is_empty() {
            return Err(QueryError::InvalidArgument(
                "keyset pagination needs at least one ORDER BY item".into(),
            ));
        }
        Ok(self.model.order_by.iter().map(KeysetKey::from).collect())
    }

    fn ensure_countable(&self, model: &QueryModel) -> QueryResult<()> {
        if model.kind != StatementKind::Select {
            return Err(QueryError::InvalidArgument(format!(
                "count queries need a SELECT statement, not {:?}",
                model.kind
            )));
        }
        if !model.having.is_empty() {
            return Err(QueryError::unsupported(
                "count query for a statement with HAVING",
                self.config.dialect,
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Statement bodies
    // =========================================================================

    fn statement_tokens(&self, model: &'a QueryModel, options: &BodyOptions) -> QueryResult<TokenStream> {
        match model.kind {
            StatementKind::Select => self.select_tokens(model, options),
            StatementKind::Update => self.update_tokens(model),
            StatementKind::Delete => self.delete_tokens(model),
            StatementKind::Insert => self.insert_tokens(model, options),
        }
    }

    fn select_tokens(&self, model: &'a QueryModel, options: &BodyOptions) -> QueryResult<TokenStream> {
        let ctx = self.context(model);
        let root = first_root(model)?;
        let mut ts = TokenStream::new();
        ts.push(Token::Select).space();
        if model.distinct {
            ts.push(Token::Distinct).space();
        }
        ts.append(&self.projection(&ctx, model, root));
        ts.space().append(&ctx.from_tokens(ScopeId::MAIN, |_| true));

        let mut predicates = model.where_clause.clone();
        predicates.extend(options.keyset.clone());
        append_predicate(&mut ts, &ctx, Token::Where, predicates);

        let group_by = group_by::group_by_items(model, self.metamodel, self.config, &ctx);
        if !group_by.is_empty() {
            let items: Vec<TokenStream> = group_by.iter().map(|e| e.to_tokens(&ctx)).collect();
            ts.space().push(Token::GroupBy).space().append_comma_separated(&items);
        }
        append_predicate(&mut ts, &ctx, Token::Having, model.having.iter().cloned());

        if !model.order_by.is_empty() {
            let items: Vec<TokenStream> = model
                .order_by
                .iter()
                .flat_map(|item| self.order_tokens(&ctx, item, options.reverse_order))
                .collect();
            ts.space().push(Token::OrderBy).space().append_comma_separated(&items);
        }

        if options.limit.is_some() || options.offset.is_some() {
            let pagination = self
                .config
                .capabilities
                .limit_style
                .emit(options.limit, options.offset);
            ts.space().append(&pagination);
        }
        Ok(ts)
    }

    fn projection(&self, ctx: &RenderContext<'_>, model: &QueryModel, root: JoinId) -> TokenStream {
        if model.select.is_empty() {
            let mut ts = TokenStream::new();
            ts.push(Token::Ident(ctx.alias(root).to_string()));
            return ts;
        }
        let items: Vec<TokenStream> = model
            .select
            .iter()
            .map(|item| {
                let mut ts = item.expr.expr.to_tokens(ctx);
                if let Some(alias) = &item.alias {
                    ts.space()
                        .push(Token::As)
                        .space()
                        .push(Token::Ident(alias.clone()));
                }
                ts
            })
            .collect();
        let mut ts = TokenStream::new();
        ts.append_comma_separated(&items);
        ts
    }

    /// One ORDER BY item, preceded by a null precedence sort key when the
    /// dialect cannot order nulls natively.
    fn order_tokens(&self, ctx: &RenderContext<'_>, item: &OrderItem, reverse: bool) -> Vec<TokenStream> {
        let ascending = item.ascending != reverse;
        let nulls_first = item.nulls_first != reverse;
        let mut target = match &item.select_alias {
            Some(alias) => {
                let mut ts = TokenStream::new();
                ts.push(Token::Ident(alias.clone()));
                ts
            }
            None => item.expr.expr.to_tokens(ctx),
        };
        target
            .space()
            .push(if ascending { Token::Asc } else { Token::Desc });

        if ctx.capabilities().null_precedence_native {
            target
                .space()
                .push(if nulls_first { Token::NullsFirst } else { Token::NullsLast });
            return vec![target];
        }
        if !item.expr.nullable {
            return vec![target];
        }
        let (null_rank, value_rank) = if nulls_first { (0, 1) } else { (1, 0) };
        let precedence = Expr::Case {
            operand: None,
            when_clauses: vec![(Expr::is_null(item.expr.expr.clone(), false), Expr::int(null_rank))],
            else_clause: Some(Box::new(Expr::int(value_rank))),
        };
        vec![precedence.to_tokens(ctx), target]
    }

    fn count_tokens(
        &self,
        model: &'a QueryModel,
        ctx: &RenderContext<'_>,
        projection: TokenStream,
        include: impl Fn(JoinId) -> bool,
    ) -> QueryResult<TokenStream> {
        first_root(model)?;
        let mut ts = TokenStream::new();
        ts.push(Token::Select).space().append(&projection);
        ts.space().append(&ctx.from_tokens(ScopeId::MAIN, include));
        append_predicate(&mut ts, ctx, Token::Where, model.where_clause.iter().cloned());
        Ok(ts)
    }

    // =========================================================================
    // DML
    // =========================================================================

    fn dml_target(&self, ctx: &RenderContext<'_>, model: &QueryModel) -> QueryResult<TokenStream> {
        let root = first_root(model)?;
        let node = ctx.graph().node(root);
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(node.entity_name.clone()))
            .space()
            .push(Token::Ident(node.alias.clone()));
        Ok(ts)
    }

    fn update_tokens(&self, model: &'a QueryModel) -> QueryResult<TokenStream> {
        if model.set_clauses.is_empty() {
            return Err(QueryError::InvalidArgument(
                "UPDATE needs at least one SET clause".into(),
            ));
        }
        let ctx = self.context(model);
        let mut ts = TokenStream::new();
        ts.push(Token::Update)
            .space()
            .append(&self.dml_target(&ctx, model)?)
            .space()
            .push(Token::Set)
            .space();
        let assignments: Vec<TokenStream> = model
            .set_clauses
            .iter()
            .map(|set| {
                let mut ts = set.target.to_tokens(&ctx);
                ts.space().push(Token::Eq).space().append(&set.value.to_tokens(&ctx));
                ts
            })
            .collect();
        ts.append_comma_separated(&assignments);
        append_predicate(&mut ts, &ctx, Token::Where, model.where_clause.iter().cloned());
        append_returning(&mut ts, &ctx, model);
        Ok(ts)
    }

    fn delete_tokens(&self, model: &'a QueryModel) -> QueryResult<TokenStream> {
        let ctx = self.context(model);
        let mut ts = TokenStream::new();
        ts.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .append(&self.dml_target(&ctx, model)?);
        append_predicate(&mut ts, &ctx, Token::Where, model.where_clause.iter().cloned());
        append_returning(&mut ts, &ctx, model);
        Ok(ts)
    }

    fn insert_tokens(&self, model: &'a QueryModel, options: &BodyOptions) -> QueryResult<TokenStream> {
        let target = model
            .insert
            .as_ref()
            .filter(|target| !target.columns.is_empty())
            .ok_or_else(|| QueryError::InvalidArgument("INSERT binds no attributes".into()))?;
        let mut ts = TokenStream::new();
        ts.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .push(Token::Ident(target.entity.clone()))
            .lparen();
        let columns: Vec<TokenStream> = target
            .columns
            .iter()
            .map(|c| {
                let mut ts = TokenStream::new();
                ts.push(Token::Ident(c.clone()));
                ts
            })
            .collect();
        ts.append_comma_separated(&columns).rparen().newline();
        ts.append(&self.select_tokens(model, options)?);
        Ok(ts)
    }

    // =========================================================================
    // CTEs
    // =========================================================================

    fn cte_tokens(&self) -> QueryResult<TokenStream> {
        let mut ts = TokenStream::new();
        let ctes = &self.model.ctes;
        if ctes.is_empty() {
            return Ok(ts);
        }
        ts.push(Token::With).space();
        if ctes.iter().any(|c| c.recursive) && self.config.capabilities.emit_recursive_keyword {
            ts.push(Token::Recursive).space();
        }
        for (i, cte) in ctes.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            let columns: Vec<TokenStream> = cte
                .columns
                .iter()
                .map(|c| {
                    let mut ts = TokenStream::new();
                    ts.push(Token::Ident(c.clone()));
                    ts
                })
                .collect();
            ts.push(Token::Ident(cte.name.clone()))
                .lparen()
                .append_comma_separated(&columns)
                .rparen()
                .space()
                .push(Token::As)
                .lparen()
                .newline();
            ts.append(&self.statement_tokens(&cte.base, &BodyOptions::default())?);
            if let Some(part) = &cte.recursive_part {
                ts.newline()
                    .push(Token::Union)
                    .space()
                    .push(Token::All)
                    .newline();
                ts.append(&self.statement_tokens(part, &BodyOptions::default())?);
            }
            ts.newline().rparen();
        }
        ts.newline();
        Ok(ts)
    }
}

fn first_root(model: &QueryModel) -> QueryResult<JoinId> {
    model
        .graph
        .roots(ScopeId::MAIN)
        .first()
        .copied()
        .ok_or_else(|| QueryError::InvalidArgument("statement has no FROM item".into()))
}

fn append_predicate(
    ts: &mut TokenStream,
    ctx: &RenderContext<'_>,
    keyword: Token,
    predicates: impl IntoIterator<Item = Expr>,
) {
    if let Some(predicate) = Expr::conjunction(predicates) {
        ts.space().push(keyword).space().append(&predicate.to_tokens(ctx));
    }
}

fn append_returning(ts: &mut TokenStream, ctx: &RenderContext<'_>, model: &QueryModel) {
    if model.returning.is_empty() {
        return;
    }
    let items: Vec<TokenStream> = model.returning.iter().map(|e| e.to_tokens(ctx)).collect();
    ts.space().push(Token::Returning).space().append_comma_separated(&items);
}

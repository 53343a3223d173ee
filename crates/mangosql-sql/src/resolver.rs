//! Query resolution against a built schema
//!
//! Resolves each output column of a hand-written SELECT to the schema column
//! it reads, or to a heuristic type when it is computed.

use mangosql_core::{Column, LogicalType, Query as ResolvedQuery, QueryMacro, Schema, TableDeps};
use sqlparser::ast::{
    Expr, GroupByExpr, Ident, Query, Select, SelectItem, SetExpr, TableFactor,
    TableWithJoins,
};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::ddl::object_name;
use crate::macros::fold;
use crate::naming::{snake_case, upper_camel_case};

/// What one projection item asks for
enum Projection {
    /// A `[prefix.]column` reference
    Column {
        prefix: Option<String>,
        name: String,
        alias: Option<String>,
    },

    /// `*` or `prefix.*`
    Wildcard { prefix: Option<String> },

    /// Anything else
    Expression { alias: Option<String> },
}

/// CTE names mapped to the concrete tables they read
type CteTables = BTreeMap<String, Vec<String>>;

/// Resolves parsed queries against a schema and a set of macros
pub struct QueryResolver<'a> {
    schema: &'a Schema,
    macros: &'a [QueryMacro],

    /// Macros already matched, so repeated query text picks the next one
    used: Vec<bool>,
}

impl<'a> QueryResolver<'a> {
    /// Create a resolver for one batch of queries
    pub fn new(schema: &'a Schema, macros: &'a [QueryMacro]) -> Self {
        Self {
            schema,
            macros,
            used: vec![false; macros.len()],
        }
    }

    /// Resolve a query, or `None` when no macro names it
    pub fn resolve(&mut self, query: &Query) -> Option<ResolvedQuery> {
        let text = query.to_string();
        let query_macro = self.find_macro(&fold(&text))?;

        let Some(select) = first_select(&query.body) else {
            warn!(method = %query_macro.method, "Query macro does not name a SELECT, skipping");
            return None;
        };

        let ctes = cte_tables(query);
        let mut deps = Vec::new();
        for table in &select.from {
            collect_table_with_joins(table, &ctes, &mut deps);
        }

        let mut fields = Vec::new();
        let mut original = Vec::new();
        for (i, item) in select.projection.iter().enumerate() {
            fields.extend(self.resolve_item(i, item, &deps));
            original.push(item.to_string());
        }

        fields.sort_by_key(|column| column.order);
        let mut seen = HashSet::new();
        fields.retain(|column| seen.insert((column.name.clone(), column.alias.clone())));

        let resolved = ResolvedQuery {
            query: text,
            method: query_macro.method.trim().to_string(),
            name: query_macro.name.trim().to_string(),
            select: fields
                .iter()
                .map(|column| format!("{} AS {}", column.name, column.output_name()))
                .collect::<Vec<_>>()
                .join(", "),
            select_original: original.join(", "),
            select_fields: fields,
            from: select
                .from
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            where_clause: select
                .selection
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            group_by: group_by(select),
            having: select
                .having
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        };

        debug!(
            method = %resolved.method,
            name = %resolved.name,
            fields = resolved.select_fields.len(),
            "Resolved query"
        );
        Some(resolved)
    }

    /// Exact fingerprint match first, then the first macro that is a prefix
    fn find_macro(&mut self, fingerprint: &str) -> Option<QueryMacro> {
        let exact = self.pick(|m| m.query == fingerprint);
        let index = exact.or_else(|| self.pick(|m| fingerprint.starts_with(&m.query)))?;
        self.used[index] = true;
        Some(self.macros[index].clone())
    }

    /// First unused macro passing the test, else the first one at all
    fn pick(&self, test: impl Fn(&QueryMacro) -> bool) -> Option<usize> {
        let mut matching = self
            .macros
            .iter()
            .enumerate()
            .filter(|(_, m)| test(*m))
            .map(|(i, _)| i);
        let first = matching.next()?;
        if !self.used[first] {
            return Some(first);
        }
        Some(matching.find(|i| !self.used[*i]).unwrap_or(first))
    }

    fn resolve_item(&self, i: usize, item: &SelectItem, deps: &[TableDeps]) -> Vec<Column> {
        match projection(item) {
            Projection::Column {
                prefix,
                name,
                alias,
            } => {
                let resolved =
                    self.match_columns(i, prefix.as_deref(), Some(name.as_str()), alias.as_deref(), deps);
                if !resolved.is_empty() {
                    return resolved;
                }
                vec![heuristic_column(i, &expression_text(item), alias)]
            }
            Projection::Wildcard { prefix } => {
                let resolved = self.match_columns(i, prefix.as_deref(), None, None, deps);
                if !resolved.is_empty() {
                    return resolved;
                }
                vec![heuristic_column(i, &item.to_string(), None)]
            }
            Projection::Expression { alias } => {
                vec![heuristic_column(i, &expression_text(item), alias)]
            }
        }
    }

    /// Every schema column the reference can denote
    ///
    /// A prefix must equal the alias or the concrete table name; without one
    /// every table in the FROM clause is searched. `name = None` is a wildcard.
    fn match_columns(
        &self,
        i: usize,
        prefix: Option<&str>,
        name: Option<&str>,
        alias: Option<&str>,
        deps: &[TableDeps],
    ) -> Vec<Column> {
        let mut columns = Vec::new();

        for (j, dep) in deps.iter().enumerate() {
            for (k, table_name) in dep.names.iter().enumerate() {
                if let Some(prefix) = prefix {
                    if prefix != dep.alias && prefix != table_name.as_str() {
                        continue;
                    }
                }
                let Some(table) = self.schema.table(table_name) else {
                    continue;
                };
                let table_alias = if dep.alias.is_empty() {
                    table_name.as_str()
                } else {
                    dep.alias.as_str()
                };

                let sources: Vec<&Column> = match name {
                    Some(name) => table.column(name).into_iter().collect(),
                    None => table.columns_ordered(),
                };

                for source in sources {
                    let output = match alias {
                        Some(alias) => alias.to_string(),
                        None if j == 0 => source.name.clone(),
                        None => snake_case(&format!("{}_{}", table_alias, source.name)),
                    };
                    let qualified = format!("{}.{}", table_alias, source.name);

                    let mut column = source.clone();
                    column.reference = Some(upper_camel_case(&qualified));
                    column.name = qualified;
                    column.alias = Some(output);
                    column.table = Some(table_name.clone());
                    column.table_alias = Some(table_alias.to_string());
                    column.order = i * 1_000_000 + j * 10_000 + k * 100 + source.order;
                    columns.push(column);
                }
            }
        }

        columns
    }
}

fn ident(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

fn projection(item: &SelectItem) -> Projection {
    match item {
        SelectItem::UnnamedExpr(expr) => expression_projection(expr, None),
        SelectItem::ExprWithAlias { expr, alias } => {
            expression_projection(expr, Some(alias.value.clone()))
        }
        SelectItem::Wildcard(_) => Projection::Wildcard { prefix: None },
        SelectItem::QualifiedWildcard(name, _) => Projection::Wildcard {
            prefix: Some(object_name(name)),
        },
    }
}

fn expression_projection(expr: &Expr, alias: Option<String>) -> Projection {
    match expr {
        Expr::Identifier(name) => Projection::Column {
            prefix: None,
            name: ident(name),
            alias,
        },
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => Projection::Column {
            prefix: Some(ident(&parts[parts.len() - 2])),
            name: ident(&parts[parts.len() - 1]),
            alias,
        },
        Expr::Nested(inner) => expression_projection(inner, alias),
        _ => Projection::Expression { alias },
    }
}

/// Projection text without its alias
fn expression_text(item: &SelectItem) -> String {
    match item {
        SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => expr.to_string(),
        other => other.to_string(),
    }
}

/// Output column for an expression no schema column backs
fn heuristic_column(i: usize, text: &str, alias: Option<String>) -> Column {
    let lowered = text.to_lowercase();
    let logical_type = if lowered.starts_with("count(") {
        LogicalType::Integer
    } else if ["avg(", "sum(", "max(", "min("]
        .iter()
        .any(|function| lowered.starts_with(function))
    {
        LogicalType::Float
    } else {
        LogicalType::String
    };

    let alias = alias
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| snake_case(text));
    let alias = if alias.is_empty() {
        format!("column_{}", i)
    } else {
        alias
    };

    warn!(
        expression = %text,
        alias = %alias,
        logical_type = %logical_type,
        "Query column is not a schema column, typing it heuristically"
    );

    let mut column = Column::new(text, logical_type)
        .with_type_sql("UNKNOWN")
        .with_nullable(false)
        .with_order(i * 1_000_000);
    column.reference = Some(upper_camel_case(&alias));
    column.alias = Some(alias);
    column
}

/// Leftmost SELECT of a possibly compound body
fn first_select(body: &SetExpr) -> Option<&Select> {
    match body {
        SetExpr::Select(select) => Some(select.as_ref()),
        SetExpr::Query(query) => first_select(&query.body),
        SetExpr::SetOperation { left, .. } => first_select(left),
        _ => None,
    }
}

fn cte_tables(query: &Query) -> CteTables {
    let mut ctes = CteTables::new();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let tables = tables_in_query(&cte.query, &ctes);
            ctes.insert(ident(&cte.alias.name), tables);
        }
    }
    ctes
}

/// Concrete tables a sub-query reads from
fn tables_in_query(query: &Query, outer: &CteTables) -> Vec<String> {
    let mut ctes = outer.clone();
    ctes.extend(cte_tables(query));

    let mut deps = Vec::new();
    collect_set_expr(&query.body, &ctes, &mut deps);

    let mut names: Vec<String> = Vec::new();
    for name in deps.into_iter().flat_map(|dep| dep.names) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn collect_set_expr(body: &SetExpr, ctes: &CteTables, deps: &mut Vec<TableDeps>) {
    match body {
        SetExpr::Select(select) => {
            for table in &select.from {
                collect_table_with_joins(table, ctes, deps);
            }
        }
        SetExpr::Query(query) => deps.push(TableDeps {
            names: tables_in_query(query, ctes),
            alias: String::new(),
        }),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr(left, ctes, deps);
            collect_set_expr(right, ctes, deps);
        }
        _ => {}
    }
}

fn collect_table_with_joins(table: &TableWithJoins, ctes: &CteTables, deps: &mut Vec<TableDeps>) {
    collect_relation(&table.relation, ctes, deps);
    for join in &table.joins {
        collect_relation(&join.relation, ctes, deps);
    }
}

/// Register one FROM-clause term in the alias context
fn collect_relation(relation: &TableFactor, ctes: &CteTables, deps: &mut Vec<TableDeps>) {
    match relation {
        TableFactor::Table { name, alias, .. } => {
            let table = object_name(name);
            let explicit = alias.as_ref().map(|a| ident(&a.name));
            match ctes.get(&table) {
                Some(names) => deps.push(TableDeps {
                    names: names.clone(),
                    alias: explicit.unwrap_or(table),
                }),
                None => deps.push(TableDeps {
                    names: vec![table],
                    alias: explicit.unwrap_or_default(),
                }),
            }
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => deps.push(TableDeps {
            names: tables_in_query(subquery, ctes),
            alias: alias.as_ref().map(|a| ident(&a.name)).unwrap_or_default(),
        }),
        TableFactor::NestedJoin {
            table_with_joins,
            alias,
            ..
        } => {
            let mut nested = Vec::new();
            collect_table_with_joins(table_with_joins, ctes, &mut nested);
            match alias {
                Some(alias) => deps.push(TableDeps {
                    names: nested.into_iter().flat_map(|dep| dep.names).collect(),
                    alias: ident(&alias.name),
                }),
                None => deps.extend(nested),
            }
        }
        other => warn!(relation = %other, "Skipping unsupported FROM clause term"),
    }
}

fn group_by(select: &Select) -> Vec<String> {
    match &select.group_by {
        GroupByExpr::All(_) => vec!["ALL".to_string()],
        GroupByExpr::Expressions(exprs, _) => exprs.iter().map(ToString::to_string).collect(),
    }
}

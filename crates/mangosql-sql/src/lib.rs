//! DDL and query parsing for MangoSQL
//!
//! This crate handles:
//! - Normalizing MySQL, SQLite, Firebird and PostgreSQL dumps into one grammar
//! - Parsing SQL using datafusion-sqlparser-rs
//! - Building a `Schema` from CREATE/ALTER/DROP statements
//! - Extracting query macros and resolving the queries they name

pub mod parser;
pub mod normalizer;
pub mod types;
pub mod ddl;
pub mod builder;
pub mod macros;
pub mod resolver;
pub mod naming;

pub use parser::{SqlParser, ParsedSql, ParseError};
pub use normalizer::normalize;
pub use builder::{SchemaBuilder, BuildError};
pub use macros::extract_macros;
pub use resolver::QueryResolver;

use mangosql_core::Schema;
use tracing::debug;

/// Normalize, parse and build a schema from DDL text
pub fn parse_schema(ddl: &str) -> Result<Schema, BuildError> {
    let normalized = normalize(ddl);
    let parsed = SqlParser::postgres().parse(&normalized)?;
    debug!(statements = parsed.statement_count(), "Parsed schema DDL");

    SchemaBuilder::new().build(&parsed.statements)
}

/// Resolve every macro-named query in `source` and append it to the schema
pub fn parse_queries(schema: &mut Schema, source: &str) -> Result<(), ParseError> {
    if source.trim().is_empty() {
        return Ok(());
    }

    let macros = extract_macros(source);
    let parsed = SqlParser::postgres().parse(&macros::strip_directives(source))?;
    debug!(
        statements = parsed.statement_count(),
        macros = macros.len(),
        "Parsed query source"
    );

    let mut resolver = QueryResolver::new(schema, &macros);
    let queries: Vec<_> = parsed
        .queries()
        .filter_map(|query| resolver.resolve(query))
        .collect();

    schema.queries.extend(queries);
    Ok(())
}

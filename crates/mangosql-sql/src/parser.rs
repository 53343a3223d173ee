//! SQL parsing using datafusion-sqlparser-rs
//!
//! Thin facade over `sqlparser`: the rest of the pipeline only ever sees
//! `ParsedSql` or a `ParseError` that carries the text the parser rejected.

use regex::Regex;
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser, ParserError};
use std::sync::LazyLock;

static ERROR_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Line: (\d+), Column: (\d+)").unwrap());

/// SQL parser for the PostgreSQL grammar the normalizer targets
pub struct SqlParser {
    dialect: PostgreSqlDialect,
}

impl SqlParser {
    /// Create a SQL parser for PostgreSQL
    ///
    /// Normalized DDL and hand-written queries are both parsed with this one.
    pub fn postgres() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Parse SQL string into AST
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, ParseError> {
        match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => Ok(ParsedSql {
                sql: sql.to_string(),
                statements,
            }),
            Err(error) => Err(ParseError {
                sql: sql.to_string(),
                error,
            }),
        }
    }
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// SQL string as handed to the parser
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,
}

impl ParsedSql {
    /// Get the first statement
    pub fn first_statement(&self) -> Option<&Statement> {
        self.statements.first()
    }

    /// Iterate over the top-level queries
    pub fn queries(&self) -> impl Iterator<Item = &Query> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Query(query) => Some(query.as_ref()),
            _ => None,
        })
    }

    /// Count the number of statements
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

/// SQL parsing error
#[derive(Debug)]
pub struct ParseError {
    /// SQL string the parser rejected
    pub sql: String,

    /// Parser error from sqlparser
    pub error: ParserError,
}

impl ParseError {
    /// 1-based line and column reported by the parser, when it gives one
    pub fn location(&self) -> Option<(usize, usize)> {
        let message = self.error.to_string();
        let captures = ERROR_LOCATION.captures(&message)?;
        let line = captures[1].parse().ok()?;
        let column = captures[2].parse().ok()?;
        Some((line, column))
    }

    /// Line of the rejected text the error points at
    pub fn snippet(&self) -> Option<&str> {
        let (line, _) = self.location()?;
        self.sql.lines().nth(line.checked_sub(1)?).map(str::trim)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQL parse error: {}", self.error)?;
        if let Some(snippet) = self.snippet() {
            write!(f, " near `{}`", snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

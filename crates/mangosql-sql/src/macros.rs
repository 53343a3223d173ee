//! Query macro extraction
//!
//! A macro is a comment directive `-- <method>:<name>` followed by the query
//! it names, up to the next semicolon. The query may start on the directive
//! line or on the lines after it.

use mangosql_core::QueryMacro;
use regex::Regex;
use std::sync::LazyLock;

use crate::parser::SqlParser;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*--[ \t]*(?P<method>\w+)[ \t]*:[ \t]*(?P<name>[\w.]+)(?P<sql>[^;]*);")
        .unwrap()
});

/// Directive header with a query on the same line
static INLINE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^([ \t]*)--[ \t]*\w+[ \t]*:[ \t]*[\w.]+[ \t]+((?:select|with|insert|update|delete)\b|\()")
        .unwrap()
});

/// Find every macro in raw query source, in source order
pub fn extract_macros(source: &str) -> Vec<QueryMacro> {
    DIRECTIVE
        .captures_iter(source)
        .filter_map(|captures| {
            let query = fingerprint(&captures["sql"]);
            if query.is_empty() {
                return None;
            }
            Some(QueryMacro {
                method: captures["method"].to_string(),
                name: captures["name"].to_string(),
                query,
            })
        })
        .collect()
}

/// Matching key for a query body
///
/// The body is rendered through the parser when it parses as a single
/// statement, so it compares equal to the rendering of the parsed query.
pub fn fingerprint(body: &str) -> String {
    let rendered = match SqlParser::postgres().parse(body) {
        Ok(parsed) if parsed.statement_count() == 1 => parsed
            .first_statement()
            .map(|statement| statement.to_string())
            .unwrap_or_else(|| body.to_string()),
        _ => body.to_string(),
    };
    fold(&rendered)
}

/// Lower-case and drop every whitespace character
pub fn fold(sql: &str) -> String {
    sql.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Remove directive headers that share a line with their query
///
/// Headers on a line of their own are plain comments to the parser and are
/// left alone.
pub fn strip_directives(source: &str) -> String {
    INLINE_HEADER.replace_all(source, "$1$2").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directive_on_its_own_line() {
        let source = "-- FindUsers:users\nSELECT id,\n  name FROM users;\n";
        let macros = extract_macros(source);

        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].method, "FindUsers");
        assert_eq!(macros[0].name, "users");
        assert_eq!(macros[0].query, "selectid,namefromusers");
    }

    #[test]
    fn directive_sharing_a_line() {
        let source = "-- FindActive:users SELECT id, name FROM users WHERE active = true;";
        let macros = extract_macros(source);

        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].method, "FindActive");
        assert_eq!(macros[0].query, "selectid,namefromuserswhereactive=true");

        assert_eq!(
            strip_directives(source),
            "SELECT id, name FROM users WHERE active = true;"
        );
    }

    #[test]
    fn several_directives_in_order() {
        let source = "-- First:a\nSELECT 1;\n\n-- Second:b\nSELECT id FROM b;\n";
        let macros = extract_macros(source);

        let methods: Vec<&str> = macros.iter().map(|m| m.method.as_str()).collect();
        assert_eq!(methods, vec!["First", "Second"]);
    }

    #[test]
    fn fingerprint_matches_parser_rendering() {
        let source = "SELECT u.id FROM users u WHERE u.id != 1";
        let parsed = SqlParser::postgres().parse(source).unwrap();
        let rendered = parsed.first_statement().unwrap().to_string();

        assert_eq!(fingerprint(source), fold(&rendered));
    }

    #[test]
    fn own_line_headers_are_kept() {
        let source = "-- FindUsers:users\nSELECT id FROM users;";
        assert_eq!(strip_directives(source), source);
    }

    #[test]
    fn plain_comments_are_not_macros() {
        assert!(extract_macros("-- just a note\nSELECT 1;").is_empty());
    }
}

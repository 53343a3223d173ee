//! Dialect normalization
//!
//! Rewrites MySQL, SQLite and PostgreSQL flavored DDL into the subset the
//! statement parser accepts. `normalize` runs an ordered list of passes; each
//! pass is idempotent and works on plain text, only assuming statements end
//! with `;`.
//!
//! Passes never edit the text while scanning it. They collect every edit
//! first and hand the list to [`splice_reverse`], which applies them from the
//! highest offset down so earlier offsets stay valid.

use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::LazyLock;
use tracing::trace;

/// A single text replacement, in byte offsets of the pass input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl Edit {
    pub fn new(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    pub fn remove(range: Range<usize>) -> Self {
        Self::new(range, "")
    }
}

/// Apply edits from the highest start offset to the lowest
///
/// An edit overlapping one that was already applied is dropped; on equal
/// start offsets the longer edit wins.
pub fn splice_reverse(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| {
        b.range
            .start
            .cmp(&a.range.start)
            .then_with(|| b.range.end.cmp(&a.range.end))
    });

    let mut out = text.to_string();
    let mut floor = text.len();
    for edit in edits {
        if edit.range.end > floor || edit.range.start > edit.range.end {
            continue;
        }
        out.replace_range(edit.range.clone(), &edit.replacement);
        floor = edit.range.start;
    }
    out
}

/// Build one edit per regex match
fn regex_edits(re: &Regex, text: &str, replace: impl Fn(&Captures) -> Option<Edit>) -> Vec<Edit> {
    re.captures_iter(text).filter_map(|caps| replace(&caps)).collect()
}

/// Replace every match of `re` with a fixed string
fn replace_matches(re: &Regex, text: &str, replacement: &str) -> String {
    let edits = regex_edits(re, text, |caps| {
        caps.get(0).map(|m| Edit::new(m.range(), replacement))
    });
    splice_reverse(text, edits)
}

/// Remove capture group `group` of every match of `re`
fn remove_group(re: &Regex, text: &str, group: usize) -> String {
    let edits = regex_edits(re, text, |caps| caps.get(group).map(|m| Edit::remove(m.range())));
    splice_reverse(text, edits)
}

type Pass = fn(&str) -> String;

const PASSES: &[(&str, Pass)] = &[
    ("strip_block_comments", strip_block_comments),
    ("strip_line_comments", strip_line_comments),
    ("strip_procedural_definitions", strip_procedural_definitions),
    ("filter_statements", filter_statements),
    ("translate_column_types", translate_column_types),
    ("strip_dialect_clauses", strip_dialect_clauses),
    ("strip_index_predicates", strip_index_predicates),
    ("strip_inherits", strip_inherits),
    ("strip_operator_classes", strip_operator_classes),
    ("canonical_quotes", canonical_quotes),
    ("rewrite_key_definitions", rewrite_key_definitions),
    ("collapse_dangling_commas", collapse_dangling_commas),
];

/// Normalize dialect-specific DDL into parser-acceptable text
pub fn normalize(sql: &str) -> String {
    PASSES.iter().fold(sql.to_string(), |text, (name, pass)| {
        let rewritten = pass(&text);
        trace!(
            pass = *name,
            before = text.len(),
            after = rewritten.len(),
            "normalizer pass"
        );
        rewritten
    })
}

// ---------------------------------------------------------------------------
// Comments

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/;?").unwrap());

fn strip_block_comments(sql: &str) -> String {
    replace_matches(&BLOCK_COMMENT, sql, " ")
}

/// Remove `--` comments outside quoted text, up to (not including) the newline
fn strip_line_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut edits = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map(|p| i + p).unwrap_or(sql.len());
                edits.push(Edit::remove(i..end));
                i = end;
            }
            _ => i += 1,
        }
    }

    splice_reverse(sql, edits)
}

// ---------------------------------------------------------------------------
// Scanning helpers

/// Offset just past the quoted run starting at `start` (doubled quotes escape)
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// End offset of a `$tag$` opener at `start`, if there is one
fn dollar_tag(sql: &str, start: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    let tag_starts_with_digit = bytes.get(start + 1).is_some_and(u8::is_ascii_digit);
    (bytes.get(i) == Some(&b'$') && !tag_starts_with_digit).then_some(i + 1)
}

/// Offset just past the `;` that terminates a procedural definition
///
/// Skips quoted text and `$tag$` bodies, and ignores `;` nested inside
/// `BEGIN`/`CASE` ... `END` blocks.
fn procedural_end(sql: &str, from: usize) -> usize {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = from;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'$' => {
                if let Some(tag_end) = dollar_tag(sql, i) {
                    let tag = &sql[i..tag_end];
                    i = sql[tag_end..]
                        .find(tag)
                        .map(|p| tag_end + p + tag.len())
                        .unwrap_or(bytes.len());
                    continue;
                }
            }
            b';' if depth == 0 => return i + 1,
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &sql[start..i];
                if word.eq_ignore_ascii_case("begin") || word.eq_ignore_ascii_case("case") {
                    depth += 1;
                } else if word.eq_ignore_ascii_case("end") {
                    depth = depth.saturating_sub(1);
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    bytes.len()
}

/// Offset of the next `;` outside quoted text, or the end of `sql`
fn statement_end(sql: &str, from: usize) -> usize {
    let bytes = sql.as_bytes();
    let mut i = from;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b';' => return i,
            _ => {}
        }
        i += 1;
    }

    bytes.len()
}

/// Offset of the `)` matching the `(` at `open`
fn matching_paren(sql: &str, open: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Trimmed spans of the comma-separated definitions at nesting depth zero
fn split_definitions(body: &str) -> Vec<Range<usize>> {
    let bytes = body.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    let mut i = 0;

    let mut push = |start: usize, end: usize| {
        let segment = &body[start..end];
        let leading = segment.len() - segment.trim_start().len();
        let trailing = segment.len() - segment.trim_end().len();
        if leading < segment.len() {
            spans.push(start + leading..end - trailing);
        }
    };

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                push(from, i);
                from = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    push(from, bytes.len());

    spans
}

static CREATE_TABLE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bCREATE\s+(?:(?:GLOBAL|LOCAL|TEMP|TEMPORARY|UNLOGGED)\s+)*TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[^(;]*\(",
    )
    .unwrap()
});

/// Byte ranges of every CREATE TABLE body, parentheses excluded
fn create_table_bodies(sql: &str) -> Vec<Range<usize>> {
    CREATE_TABLE_HEAD
        .find_iter(sql)
        .filter_map(|m| {
            let open = m.end() - 1;
            matching_paren(sql, open).map(|close| open + 1..close)
        })
        .collect()
}

/// Byte ranges of every top-level definition of every CREATE TABLE body
fn create_table_definitions(sql: &str) -> Vec<Range<usize>> {
    create_table_bodies(sql)
        .into_iter()
        .flat_map(|body| {
            split_definitions(&sql[body.clone()])
                .into_iter()
                .map(move |span| body.start + span.start..body.start + span.end)
        })
        .collect()
}

static ALTER_TABLE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?(?:ONLY\s+)?(?:"[^"]*"|`[^`]*`|\w+)(?:\.(?:"[^"]*"|`[^`]*`|\w+))*"#,
    )
    .unwrap()
});
static ADD_COLUMN_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ADD\s+(?:COLUMN\s+)?(?:IF\s+NOT\s+EXISTS\s+)?").unwrap());

/// Byte ranges of the column definitions after `ALTER TABLE ... ADD [COLUMN]`
fn added_column_definitions(sql: &str) -> Vec<Range<usize>> {
    let mut definitions = Vec::new();
    for head in ALTER_TABLE_HEAD.find_iter(sql) {
        let from = head.end();
        let operations = &sql[from..statement_end(sql, from)];

        for span in split_definitions(operations) {
            let operation = &operations[span.clone()];
            let Some(add) = ADD_COLUMN_HEAD.find(operation) else {
                continue;
            };
            if add.end() < operation.len() && !is_table_level_definition(&operation[add.end()..]) {
                definitions.push(from + span.start + add.end()..from + span.end);
            }
        }
    }
    definitions
}

/// Apply `rewrite` to each range; `None` leaves the text alone
fn rewrite_ranges(
    sql: &str,
    ranges: impl IntoIterator<Item = Range<usize>>,
    rewrite: impl Fn(&str) -> Option<String>,
) -> String {
    let edits = ranges
        .into_iter()
        .filter_map(|range| {
            let replacement = rewrite(&sql[range.clone()])?;
            (replacement != sql[range.clone()]).then(|| Edit::new(range, replacement))
        })
        .collect();
    splice_reverse(sql, edits)
}

/// Apply `rewrite` to every top-level definition of every CREATE TABLE body
///
/// `rewrite` returns the replacement text, or `None` to leave it alone.
fn rewrite_definitions(sql: &str, rewrite: impl Fn(&str) -> Option<String>) -> String {
    rewrite_ranges(sql, create_table_definitions(sql), rewrite)
}

/// Run `f` on the parts of `text` outside single-quoted literals
fn map_unquoted(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let Some(open) = rest.find('\'') else {
            out.push_str(&f(rest));
            break;
        };
        out.push_str(&f(&rest[..open]));
        match rest[open + 1..].find('\'') {
            Some(close) => {
                let end = open + 1 + close + 1;
                out.push_str(&rest[open..end]);
                rest = &rest[end..];
            }
            None => {
                out.push_str(&rest[open..]);
                break;
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Procedural definitions

static PROCEDURAL_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\A|;)\s*((?:CREATE|ALTER|DROP)\s+(?:OR\s+REPLACE\s+)?(?:CONSTRAINT\s+)?(?:TRIGGER|FUNCTION|PROCEDURE|TYPE|DOMAIN|AGGREGATE|RULE)\b)",
    )
    .unwrap()
});

/// Remove procedural definitions that open a statement
///
/// `ALTER TABLE t ALTER type TYPE ...` names a column `type` and is kept.
fn strip_procedural_definitions(sql: &str) -> String {
    let mut edits = Vec::new();
    let mut pos = 0;

    while let Some(m) = PROCEDURAL_START.captures_at(sql, pos).and_then(|caps| caps.get(1)) {
        let end = procedural_end(sql, m.end());
        edits.push(Edit::remove(m.start()..end));
        if end >= sql.len() {
            break;
        }
        // the terminating `;` is the boundary of the next statement
        pos = end - 1;
    }

    splice_reverse(sql, edits)
}

// ---------------------------------------------------------------------------
// Statement filter

static KEPT_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:CREATE\s+(?:(?:GLOBAL|LOCAL|TEMP|TEMPORARY|UNLOGGED)\s+)*TABLE|CREATE\s+(?:UNIQUE\s+)?INDEX|ALTER\s+TABLE|ALTER\s+INDEX|DROP\s+TABLE|DROP\s+INDEX)\b[^;]*(?:;|\z)",
    )
    .unwrap()
});

/// Fragments that disqualify an otherwise kept statement
const REJECTED_FRAGMENTS: &[&str] = &[
    "owner to",
    "to_tsvector",
    "alter column index",
    "replica identity",
    "cluster on",
    "attach partition",
    "row level security",
    "add generated",
];

/// Keep only table and index DDL, one statement per line
fn filter_statements(sql: &str) -> String {
    KEPT_STATEMENT
        .find_iter(sql)
        .map(|m| m.as_str().trim_end())
        .filter(|statement| {
            let lower = statement.to_lowercase();
            !REJECTED_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
        })
        .map(|statement| {
            if statement.ends_with(';') {
                statement.to_string()
            } else {
                format!("{};", statement)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Column types

static COLUMN_TYPE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s(?:references|foreign\s+key)\s").unwrap());
static TYPE_COLLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s*\b(?:CHARACTER\s+SET|CHARSET|COLLATE)\s*=?\s*(?:"[^"]*"|[\w.]+)"#).unwrap()
});
static TYPE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\bCOMMENT\s+'(?:[^']|'')*'").unwrap());
static TYPE_ON_UPDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+ON\s+(?:DELETE|UPDATE)(?:\s+SET)?\s+\w+(?:\(\))?").unwrap());
static TYPE_UNSIGNED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\b(?:unsigned|zerofill)\b").unwrap());
static TYPE_ENUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:enum|set)\s*\([^)]*\)").unwrap());
static TYPE_INT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:integer|smallint|tinyint|mediumint|bigint|int)\b(?:\s*\([\d,\s]*\))?").unwrap()
});
static TYPE_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:double\s+precision|double|float)\b(?:\s*\([\d,\s]*\))?").unwrap()
});
static TYPE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:character\s+set\s+\w+|character\s+varying|character|nvarchar|varchar|bpchar|nchar|char|mediumtext|longtext|tinytext)\b(?:\s*\([^)]*\))?",
    )
    .unwrap()
});
static TYPE_TEXT_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btext\s+text\b").unwrap());
static TYPE_BINARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:varbinary|binary|longblob|mediumblob|tinyblob|blob|tsvector)\b(?:\s*\(\d*\))?")
        .unwrap()
});
static TYPE_SUB_TYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*\bSUB_TYPE\s+\w+").unwrap());
static TYPE_DATETIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:datetime|timestamp)\b(?:\s*\(\d*\))?").unwrap());
static TYPE_AUTOINCREMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAUTOINCREMENT\b").unwrap());
static TYPE_SERIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\binteger\b(.*?)\s*\bAUTO_INCREMENT\b").unwrap());
static TYPE_AUTO_INCREMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\bAUTO_INCREMENT\b").unwrap());

/// Definitions inside a CREATE TABLE body that are not columns
fn is_table_level_definition(definition: &str) -> bool {
    let lower = definition.to_lowercase();
    let keyword = lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    matches!(
        keyword,
        "primary"
            | "constraint"
            | "unique"
            | "foreign"
            | "key"
            | "index"
            | "check"
            | "fulltext"
            | "spatial"
            | "exclude"
            | "like"
    )
}

/// Split a column definition into its quoted name and the rest
fn split_column_name(definition: &str) -> (String, &str) {
    let first = definition.chars().next().unwrap_or_default();
    let (name, rest) = match first {
        '"' | '`' | '[' => {
            let close = if first == '[' { ']' } else { first };
            match definition[1..].find(close) {
                Some(end) => (&definition[1..end + 1], &definition[end + 2..]),
                None => (&definition[1..], ""),
            }
        }
        _ => {
            let end = definition
                .find(char::is_whitespace)
                .unwrap_or(definition.len());
            (&definition[..end], &definition[end..])
        }
    };
    (format!("\"{}\"", name), rest)
}

/// Split the type part from a trailing inline reference clause
fn split_type_reference(rest: &str) -> (&str, &str) {
    match COLUMN_TYPE_REF.find(rest) {
        Some(m) => (&rest[..m.start()], &rest[m.start()..]),
        None => (rest, ""),
    }
}

/// Rewrite a column's type part into the shared type vocabulary
fn translate_type(column_type: &str) -> String {
    let mut ty = replace_matches(&TYPE_COMMENT, column_type, "");
    ty = replace_matches(&TYPE_ON_UPDATE, &ty, "");
    ty = replace_matches(&TYPE_UNSIGNED, &ty, "");
    ty = replace_matches(&TYPE_ENUM, &ty, "text");

    ty = map_unquoted(&ty, |segment| {
        let mut segment = replace_matches(&TYPE_COLLATE, segment, "");
        segment = replace_matches(&TYPE_INT, &segment, "integer");
        segment = replace_matches(&TYPE_FLOAT, &segment, "real");
        segment = replace_matches(&TYPE_TEXT, &segment, "text");
        segment = replace_matches(&TYPE_TEXT_TEXT, &segment, "text");
        segment = replace_matches(&TYPE_BINARY, &segment, "bytea");
        segment = replace_matches(&TYPE_SUB_TYPE, &segment, "");
        segment = replace_matches(&TYPE_DATETIME, &segment, "timestamp");
        segment.split_whitespace().collect::<Vec<_>>().join(" ")
    });

    ty = replace_matches(&TYPE_AUTOINCREMENT, &ty, "AUTO_INCREMENT");
    let edits = regex_edits(&TYPE_SERIAL, &ty, |caps| {
        let whole = caps.get(0)?;
        let between = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        Some(Edit::new(whole.range(), format!("serial{}", between)))
    });
    ty = splice_reverse(&ty, edits);
    ty = replace_matches(&TYPE_AUTO_INCREMENT, &ty, "");

    ty.trim().to_string()
}

/// Rebuild a column definition as `"name" type [reference]`
fn translate_column(definition: &str) -> String {
    let (name, rest) = split_column_name(definition);
    let (column_type, reference) = split_type_reference(rest);
    [name, translate_type(column_type), reference.trim().to_string()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Translate the columns of CREATE TABLE bodies and of ADD COLUMN operations
fn translate_column_types(sql: &str) -> String {
    let columns = create_table_definitions(sql)
        .into_iter()
        .filter(|range| !is_table_level_definition(&sql[range.clone()]))
        .chain(added_column_definitions(sql));
    rewrite_ranges(sql, columns, |definition| Some(translate_column(definition)))
}

// ---------------------------------------------------------------------------
// Dialect-only clauses

static CHARSET_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+(?:DEFAULT\s+)?(?:CHARACTER\s+SET|CHARSET)\s*=?\s*['"]?\w+['"]?"#).unwrap()
});
static COLLATE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+(?:DEFAULT\s+)?COLLATE\s*=?\s*(?:[\w.]+|"[^"]*"|'[^']*')+"#).unwrap()
});
static TABLE_OPTION_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+(?:ENGINE|AUTO_INCREMENT|ROW_FORMAT|AVG_ROW_LENGTH|KEY_BLOCK_SIZE|MAX_ROWS|MIN_ROWS|PACK_KEYS|CHECKSUM|DELAY_KEY_WRITE|STATS_PERSISTENT)\s*=\s*\w+",
    )
    .unwrap()
});
static COMMENT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+COMMENT\s*=?\s*'(?:[^']|'')*'").unwrap());

/// Strip table options; charset and collation only after a CREATE TABLE body
fn strip_dialect_clauses(sql: &str) -> String {
    let mut edits = Vec::new();
    for body in create_table_bodies(sql) {
        let from = body.end + 1;
        let options = &sql[from..statement_end(sql, from)];
        for re in [&CHARSET_CLAUSE, &COLLATE_CLAUSE] {
            edits.extend(
                re.find_iter(options)
                    .map(|m| Edit::remove(from + m.start()..from + m.end())),
            );
        }
    }

    [&TABLE_OPTION_CLAUSE, &COMMENT_CLAUSE]
        .into_iter()
        .fold(splice_reverse(sql, edits), |text, re| replace_matches(re, &text, ""))
}

// ---------------------------------------------------------------------------
// Index predicates, inheritance and operator classes

static INDEX_PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCREATE\s+(?:UNIQUE\s+)?INDEX\b[^;]*?(\s+WHERE\s+[^;]*);").unwrap()
});
static INHERITS_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCREATE\s+(?:\w+\s+)*?TABLE\b[^;]*?(\s*\bINHERITS\s*\([^)]*\))").unwrap()
});
static CREATE_INDEX_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCREATE\s+(?:UNIQUE\s+)?INDEX\b[^;(]*\(").unwrap());
static OPERATOR_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^.*\S(\s+(?:\w+\.)?\w+_ops)(?:\s+(?:ASC|DESC|NULLS\s+(?:FIRST|LAST)))*$").unwrap()
});

fn strip_index_predicates(sql: &str) -> String {
    remove_group(&INDEX_PREDICATE, sql, 1)
}

fn strip_inherits(sql: &str) -> String {
    remove_group(&INHERITS_CLAUSE, sql, 1)
}

/// Drop the operator class following a key in a CREATE INDEX column list
fn strip_operator_classes(sql: &str) -> String {
    let mut edits = Vec::new();
    for head in CREATE_INDEX_HEAD.find_iter(sql) {
        let open = head.end() - 1;
        let Some(close) = matching_paren(sql, open) else {
            continue;
        };
        for span in split_definitions(&sql[open + 1..close]) {
            let start = open + 1 + span.start;
            let key = &sql[start..open + 1 + span.end];
            if let Some(class) = OPERATOR_CLASS.captures(key).and_then(|caps| caps.get(1)) {
                edits.push(Edit::remove(start + class.start()..start + class.end()));
            }
        }
    }
    splice_reverse(sql, edits)
}

// ---------------------------------------------------------------------------
// Quoting and keys

static BACKTICK_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());

fn canonical_quotes(sql: &str) -> String {
    let edits = regex_edits(&BACKTICK_IDENTIFIER, sql, |caps| {
        let whole = caps.get(0)?;
        let name = caps.get(1)?.as_str().trim();
        Some(Edit::new(whole.range(), format!("\"{}\"", name)))
    });
    splice_reverse(sql, edits)
}

static UNIQUE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^UNIQUE\s+(?:KEY|INDEX)\s*("[^"]*"|\w+)?\s*(\(.*\))(?:\s+USING\s+\w+)?$"#).unwrap()
});
static PLAIN_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:KEY|INDEX|FULLTEXT|SPATIAL)\b").unwrap());
static TRAILING_USING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^((?:PRIMARY|UNIQUE|CONSTRAINT)\b.*\))\s+USING\s+\w+$").unwrap());

/// Turn MySQL key definitions into constraints, drop plain secondary keys
fn rewrite_key_definitions(sql: &str) -> String {
    rewrite_definitions(sql, |definition| {
        if let Some(caps) = UNIQUE_KEY.captures(definition) {
            let columns = caps.get(2)?.as_str();
            return Some(match caps.get(1) {
                Some(name) => format!("CONSTRAINT {} UNIQUE {}", name.as_str(), columns),
                None => format!("UNIQUE {}", columns),
            });
        }
        if PLAIN_KEY.is_match(definition) {
            return Some(String::new());
        }
        TRAILING_USING
            .captures(definition)
            .and_then(|caps| caps.get(1))
            .map(|kept| kept.as_str().to_string())
    })
}

static REPEATED_COMMAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(?:\s*,)+").unwrap());
static LEADING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*,").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*\)").unwrap());

fn collapse_dangling_commas(sql: &str) -> String {
    let text = replace_matches(&REPEATED_COMMAS, sql, ",");
    let text = replace_matches(&LEADING_COMMA, &text, "(");
    replace_matches(&TRAILING_COMMA, &text, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn splice_applies_highest_offset_first() {
        let text = "abcdef";
        let edits = vec![
            Edit::new(0..1, "XX"),
            Edit::new(2..4, ""),
            Edit::new(5..6, "YYY"),
        ];
        assert_eq!(splice_reverse(text, edits), "XXbeYYY");
    }

    #[test]
    fn splice_drops_overlapping_edits() {
        let text = "0123456789";
        let edits = vec![
            Edit::new(2..6, "-"),
            Edit::new(4..8, "+"),
            Edit::new(4..5, "!"),
        ];
        // 4..8 is applied first; 2..6 and 4..5 overlap it and are dropped
        assert_eq!(splice_reverse(text, edits), "0123+89");
    }

    #[test]
    fn splice_keeps_offsets_valid_across_growing_edits() {
        let text = "`a`, `b`, `c`";
        assert_eq!(canonical_quotes(text), r#""a", "b", "c""#);
    }

    #[test]
    fn block_and_line_comments() {
        let sql = "/* header */ CREATE TABLE t (\n  id int, -- the id\n  note text DEFAULT '--x'\n);";
        let out = strip_line_comments(&strip_block_comments(sql));
        assert!(!out.contains("header"));
        assert!(!out.contains("the id"));
        assert!(out.contains("'--x'"));
    }

    #[test]
    fn procedural_bodies_with_nested_terminators() {
        let sql = r#"
CREATE TABLE a (id int);
CREATE FUNCTION touch() RETURNS trigger AS $$
BEGIN
  NEW.updated_at = now();
  RETURN NEW;
END;
$$ LANGUAGE plpgsql;
CREATE TRIGGER a_touch AFTER INSERT ON a
BEGIN
  UPDATE a SET id = CASE WHEN id > 0 THEN id ELSE 0 END;
  UPDATE a SET id = id;
END;
CREATE TYPE mood AS ENUM ('sad', 'ok;', 'happy');
CREATE TABLE b (id int);
"#;
        let out = strip_procedural_definitions(sql);
        assert_eq!(
            squash(&out),
            "CREATE TABLE a (id int); CREATE TABLE b (id int);"
        );
    }

    #[test]
    fn procedural_keywords_inside_a_statement_kept() {
        let sql = "CREATE TABLE t (id integer, type text);\n\
                   ALTER TABLE t ALTER type TYPE varchar(10);\n\
                   CREATE TYPE mood AS ENUM ('sad');\n\
                   CREATE TABLE u (id integer);";
        assert_eq!(
            squash(&strip_procedural_definitions(sql)),
            "CREATE TABLE t (id integer, type text); ALTER TABLE t ALTER type TYPE varchar(10); CREATE TABLE u (id integer);"
        );
    }

    #[test]
    fn operator_classes_only_inside_index_keys() {
        let sql = "CREATE TABLE cloud_ops (dev_ops text, ops_id int);\n\
                   CREATE INDEX dev_ops_idx ON cloud_ops USING gin (dev_ops gin_trgm_ops, lower(dev_ops) public.text_pattern_ops DESC, ops_id);";
        assert_eq!(
            strip_operator_classes(sql),
            "CREATE TABLE cloud_ops (dev_ops text, ops_id int);\n\
             CREATE INDEX dev_ops_idx ON cloud_ops USING gin (dev_ops, lower(dev_ops) DESC, ops_id);"
        );
    }

    #[test]
    fn filter_keeps_table_and_index_ddl() {
        let sql = r#"
SET NAMES utf8mb4;
CREATE EXTENSION IF NOT EXISTS "uuid-ossp";
CREATE TABLE users (id int);
ALTER TABLE users OWNER TO postgres;
GRANT ALL ON users TO admin;
CREATE UNIQUE INDEX users_id ON users (id);
ALTER TABLE ONLY users ADD CONSTRAINT users_pkey PRIMARY KEY (id);
DROP TABLE IF EXISTS old_users;
INSERT INTO users VALUES (1);
DROP INDEX users_id
"#;
        assert_eq!(
            filter_statements(sql),
            "CREATE TABLE users (id int);\n\
             CREATE UNIQUE INDEX users_id ON users (id);\n\
             ALTER TABLE ONLY users ADD CONSTRAINT users_pkey PRIMARY KEY (id);\n\
             DROP TABLE IF EXISTS old_users;\n\
             DROP INDEX users_id;"
        );
    }

    #[test]
    fn translate_mysql_column_types() {
        let sql = "CREATE TABLE t (\n\
            `id` int(11) unsigned NOT NULL AUTO_INCREMENT,\n\
            `score` double(8,2) DEFAULT NULL,\n\
            `title` varchar(255) CHARACTER SET utf8 NOT NULL COMMENT 'the title',\n\
            `state` enum('a','b') NOT NULL DEFAULT 'a',\n\
            `body` longtext,\n\
            `data` mediumblob,\n\
            `created` datetime(3) NOT NULL,\n\
            `born` date,\n\
            `flag` tinyint(1) DEFAULT 'int',\n\
            `owner_id` bigint REFERENCES users(id) ON DELETE CASCADE,\n\
            PRIMARY KEY (`id`)\n\
            );";
        let out = translate_column_types(sql);

        assert!(out.contains(r#""id" serial NOT NULL,"#));
        assert!(out.contains(r#""score" real DEFAULT NULL"#));
        assert!(out.contains(r#""title" text NOT NULL,"#));
        assert!(out.contains(r#""state" text NOT NULL DEFAULT 'a'"#));
        assert!(out.contains(r#""body" text,"#));
        assert!(out.contains(r#""data" bytea,"#));
        assert!(out.contains(r#""created" timestamp NOT NULL"#));
        assert!(out.contains(r#""born" date,"#));
        assert!(out.contains(r#""flag" integer DEFAULT 'int'"#));
        assert!(out.contains(r#""owner_id" integer REFERENCES users(id) ON DELETE CASCADE"#));
        assert!(out.contains("PRIMARY KEY (`id`)"));
    }

    #[test]
    fn translate_firebird_blob_subtype() {
        let out = translate_column_types(
            "CREATE TABLE actor (description BLOB SUB_TYPE TEXT DEFAULT NULL, id numeric);",
        );
        assert_eq!(
            out,
            r#"CREATE TABLE actor ("description" bytea DEFAULT NULL, "id" numeric);"#
        );
    }

    #[test]
    fn dialect_clauses_removed() {
        let sql = "CREATE TABLE t (\"name\" text COLLATE utf8mb4_bin NOT NULL) ENGINE=InnoDB AUTO_INCREMENT=42 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci COMMENT='users';";
        assert_eq!(
            strip_dialect_clauses(&translate_column_types(sql)),
            "CREATE TABLE t (\"name\" text NOT NULL);"
        );
    }

    #[test]
    fn charset_names_outside_table_options_kept() {
        let sql = "CREATE TABLE charset (id int);\n\
                   ALTER TABLE charset ADD COLUMN charset text, ADD collate varchar(10) CHARACTER SET utf8;";
        let out = strip_dialect_clauses(&translate_column_types(sql));
        assert_eq!(
            out,
            "CREATE TABLE charset (\"id\" integer);\n\
             ALTER TABLE charset ADD COLUMN \"charset\" text, ADD \"collate\" text;"
        );
    }

    #[test]
    fn key_like_column_names_are_columns() {
        let out = translate_column_types("CREATE TABLE t (key_id int(11), primary_email varchar(20));");
        assert_eq!(out, r#"CREATE TABLE t ("key_id" integer, "primary_email" text);"#);
    }

    #[test]
    fn postgres_only_clauses_removed() {
        let sql = "CREATE INDEX active_idx ON users (name) WHERE deleted_at IS NULL;\n\
                   CREATE TABLE admins (level integer) INHERITS (users);\n\
                   CREATE INDEX name_idx ON users (name public.varchar_pattern_ops);";
        let out = strip_operator_classes(&strip_inherits(&strip_index_predicates(sql)));
        assert_eq!(
            out,
            "CREATE INDEX active_idx ON users (name);\n\
             CREATE TABLE admins (level integer);\n\
             CREATE INDEX name_idx ON users (name);"
        );
    }

    #[test]
    fn mysql_keys_rewritten() {
        let sql = r#"CREATE TABLE t ("id" integer, "email" text, PRIMARY KEY ("id") USING BTREE, UNIQUE KEY "email_key" ("email"), KEY "email_idx" ("email"), FULLTEXT KEY "ft" ("email"));"#;
        let out = collapse_dangling_commas(&rewrite_key_definitions(sql));
        assert_eq!(
            squash(&out),
            r#"CREATE TABLE t ("id" integer, "email" text, PRIMARY KEY ("id"), CONSTRAINT "email_key" UNIQUE ("email"));"#
        );
    }

    #[test]
    fn dangling_commas_collapsed() {
        assert_eq!(collapse_dangling_commas("(a, , b,\n )"), "(a, b)");
        assert_eq!(collapse_dangling_commas("( , a)"), "( a)");
    }

    #[test]
    fn normalize_is_idempotent() {
        let sql = r#"
/*!40101 SET NAMES utf8 */;
DROP TABLE IF EXISTS `users`;
CREATE TABLE `users` (
  `id` int(10) unsigned NOT NULL AUTO_INCREMENT,
  `email` varchar(191) COLLATE utf8mb4_unicode_ci NOT NULL,
  `created_at` timestamp NULL DEFAULT NULL,
  PRIMARY KEY (`id`),
  UNIQUE KEY `users_email_unique` (`email`),
  KEY `users_created_idx` (`created_at`)
) ENGINE=InnoDB AUTO_INCREMENT=3 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
LOCK TABLES `users` WRITE;
"#;
        let once = normalize(sql);
        assert_eq!(normalize(&once), once);
        assert!(once.contains(r#""id" serial NOT NULL"#));
        assert!(once.contains(r#"CONSTRAINT "users_email_unique" UNIQUE ("email")"#));
        assert!(!once.contains("users_created_idx"));
        assert!(!once.contains("ENGINE"));
        assert!(!once.contains("LOCK"));
    }
}

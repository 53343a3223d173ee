//! Entity relationship diagrams in D2
//!
//! Tables become `sql_table` shapes with their columns in declaration order,
//! foreign keys become edges between the referencing and referenced columns.

use mangosql_core::{ConstraintKind, Schema, Table};
use std::collections::BTreeSet;

/// Header of the diagram
pub struct DiagramOptions<'a> {
    /// Diagram title; no title block is written when empty
    pub title: &'a str,

    /// Extra title lines, separated by `|`
    pub meta: &'a str,

    /// Date shown under the title
    pub date: &'a str,
}

/// Render the schema as D2 source
pub fn render_d2(schema: &Schema, options: &DiagramOptions) -> String {
    let mut out = String::new();

    if !options.title.is_empty() {
        let meta: String = options
            .meta
            .split('|')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| format!("* {}\n", line))
            .collect();
        out.push_str(&format!(
            "title: |md\n# {}\n* Date: {}\n{}| {{near: bottom-left}}\n",
            options.title, options.date, meta
        ));
    }

    for table in schema.tables_ordered() {
        out.push_str(&format!("{}: {{\n\tshape: sql_table\n", shape_name(&table.name)));
        for line in column_lines(table) {
            out.push_str(&format!("\t{}\n", line));
        }
        out.push_str("}\n");
    }

    for edge in edges(schema) {
        out.push_str(&edge);
    }

    out
}

fn column_lines(table: &Table) -> Vec<String> {
    table
        .columns_ordered()
        .into_iter()
        .map(|column| {
            let name = column.name.as_str();

            let mut mark = "";
            if table.references.iter().any(|r| leads(&r.columns, name)) {
                mark = "foreign_key";
            }
            for constraint in table.constraints.iter().filter(|c| leads(&c.columns, name)) {
                match constraint.kind {
                    ConstraintKind::Primary => mark = "primary_key",
                    ConstraintKind::Unique if mark.is_empty() => mark = "unique",
                    _ => {}
                }
            }

            let type_name = column.logical_type.to_string().replace("[]", "");
            if mark.is_empty() {
                format!("{}: {}", name, type_name)
            } else {
                format!("{}: {} {{constraint: {}}}", name, type_name, mark)
            }
        })
        .collect()
}

/// Whether `name` is the first of `columns`
fn leads(columns: &[String], name: &str) -> bool {
    columns.first().is_some_and(|first| first == name)
}

/// One edge per foreign key, from its first column to the first target column
fn edges(schema: &Schema) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut edges = Vec::new();

    for table in schema.tables_ordered() {
        for reference in &table.references {
            let (Some(column), Some(target)) =
                (reference.columns.first(), reference.table_columns.first())
            else {
                continue;
            };
            let edge = format!(
                "{}.{} -> {}.{}: {{\n\tstyle.opacity: 1\n\tstyle.animated: true\n}}\n",
                shape_name(&table.name),
                column,
                shape_name(&reference.table),
                target
            );
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
    }

    edges
}

/// D2 keywords cannot name a shape
fn shape_name(table: &str) -> String {
    match table {
        "steps" | "shape" => format!("{}_table", table),
        _ => table.to_string(),
    }
}

//! Schema builder
//!
//! Applies table and index DDL in source order to an owned `Schema`, then
//! links every foreign key back onto the table it targets.

use mangosql_core::{Column, ConstraintKind, Reference, Schema, Table};
use sqlparser::ast::Statement;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::ddl::{
    self, AlterOperation, ColumnSpec, ConstraintSpec, CreateTableSpec, DdlStatement, IndexSpec,
};
use crate::parser::ParseError;

/// Schema build error types
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("{statement}: table '{table}' does not exist")]
    UnknownTable { table: String, statement: String },

    #[error("{statement}: column '{column}' does not exist in table '{table}'")]
    UnknownColumn {
        table: String,
        column: String,
        statement: String,
    },
}

/// Builds a `Schema` from a stream of DDL statements
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,

    /// Order assigned to the next created table
    next_table_order: usize,
}

impl SchemaBuilder {
    /// Create a builder over an empty schema
    pub fn new() -> Self {
        Self {
            schema: Schema::new(),
            next_table_order: 1,
        }
    }

    /// Apply every statement in order and finish the schema
    pub fn build(mut self, statements: &[Statement]) -> Result<Schema, BuildError> {
        for statement in statements.iter().filter_map(ddl::lower_statement) {
            self.apply(statement)?;
        }
        Ok(self.finish())
    }

    /// Apply a single statement
    pub fn apply(&mut self, statement: DdlStatement) -> Result<(), BuildError> {
        debug!(statement = %statement, "Applying DDL statement");
        let label = statement.to_string();

        match statement {
            DdlStatement::CreateTable(spec) => self.create_table(spec, &label),
            DdlStatement::CreateIndex(spec) => self.create_index(spec, &label),
            DdlStatement::DropTables { names, if_exists } => self.drop_tables(names, if_exists, &label),
            DdlStatement::DropIndexes { names, if_exists } => {
                self.drop_indexes(names, if_exists);
                Ok(())
            }
            DdlStatement::RenameIndex { from, to } => {
                self.rename_index(&from, &to);
                Ok(())
            }
            DdlStatement::AlterTable {
                table,
                if_exists,
                operations,
            } => self.alter_table(table, if_exists, operations, &label),
        }
    }

    /// Link inverse references and hand out the schema
    pub fn finish(mut self) -> Schema {
        link_references(&mut self.schema);
        self.schema
    }

    fn create_table(&mut self, spec: CreateTableSpec, label: &str) -> Result<(), BuildError> {
        if self.schema.tables.contains_key(&spec.name) {
            if spec.if_not_exists {
                debug!(table = %spec.name, "Table already exists, skipping");
                return Ok(());
            }
            warn!(table = %spec.name, "Table declared twice, replacing the earlier definition");
        }

        let mut table = Table::new(spec.name.clone(), self.next_table_order);
        self.next_table_order += 1;

        for (position, column) in spec.columns.into_iter().enumerate() {
            add_column(&mut table, column, position + 1, label)?;
        }
        for constraint in spec.constraints {
            add_constraint(&mut table, constraint, label)?;
        }

        self.schema.tables.insert(spec.name, table);
        Ok(())
    }

    fn create_index(&mut self, spec: IndexSpec, label: &str) -> Result<(), BuildError> {
        let table = self.table_mut(&spec.table, label)?;
        table.add_index(spec.name, spec.columns, spec.unique);
        Ok(())
    }

    fn drop_tables(&mut self, names: Vec<String>, if_exists: bool, label: &str) -> Result<(), BuildError> {
        for name in names {
            if self.schema.tables.remove(&name).is_none() && !if_exists {
                return Err(unknown_table(&name, label));
            }
        }
        Ok(())
    }

    /// Index names are schema-wide, so every table is searched
    fn drop_indexes(&mut self, names: Vec<String>, if_exists: bool) {
        for name in names {
            let dropped = self
                .schema
                .tables
                .values_mut()
                .any(|table| table.drop_index(&name));
            if !dropped && !if_exists {
                warn!(index = %name, "DROP INDEX on an index that is not in the schema");
            }
        }
    }

    fn rename_index(&mut self, from: &str, to: &str) {
        match self.schema.tables.values_mut().find(|table| table.has_index(from)) {
            Some(table) => {
                table.rename_constraint(from, to);
            }
            None => warn!(index = %from, "ALTER INDEX on an index that is not in the schema"),
        }
    }

    fn alter_table(
        &mut self,
        name: String,
        if_exists: bool,
        operations: Vec<AlterOperation>,
        label: &str,
    ) -> Result<(), BuildError> {
        let Some(mut table) = self.schema.tables.remove(&name) else {
            if if_exists {
                debug!(table = %name, "ALTER TABLE IF EXISTS on a missing table, skipping");
                return Ok(());
            }
            return Err(unknown_table(&name, label));
        };

        for operation in operations {
            match operation {
                AlterOperation::AddColumn(column) => {
                    let order = match table.column(&column.name) {
                        Some(existing) => {
                            warn!(table = %table.name, column = %column.name, "Column added twice, replacing it");
                            existing.order
                        }
                        None => table.next_column_order(),
                    };
                    add_column(&mut table, column, order, label)?;
                }
                AlterOperation::DropColumn { name, if_exists } => {
                    if table.columns.remove(&name).is_none() && !if_exists {
                        return Err(unknown_column(&table.name, &name, label));
                    }
                }
                AlterOperation::RenameColumn { from, to } => {
                    if !table.rename_column(&from, &to) {
                        return Err(unknown_column(&table.name, &from, label));
                    }
                    retarget_column(&mut self.schema, &table.name, &from, &to);
                    let own_name = table.name.clone();
                    rename_target_columns(&mut table.references, &own_name, &from, &to);
                }
                AlterOperation::AlterColumnType {
                    name,
                    logical_type,
                    type_sql,
                } => {
                    let column = column_mut(&mut table, &name, label)?;
                    column.logical_type = logical_type;
                    column.type_sql = type_sql;
                }
                AlterOperation::SetNullable { name, nullable } => {
                    column_mut(&mut table, &name, label)?.nullable = nullable;
                }
                AlterOperation::SetHasDefault { name, has_default } => {
                    column_mut(&mut table, &name, label)?.has_default = has_default;
                }
                AlterOperation::AddConstraint(constraint) => {
                    add_constraint(&mut table, constraint, label)?;
                }
                AlterOperation::DropConstraint { name, if_exists } => {
                    if !table.drop_constraint(&name) && !if_exists {
                        warn!(table = %table.name, constraint = %name, "DROP CONSTRAINT on a constraint that is not in the schema");
                    }
                }
                AlterOperation::DropPrimaryKey => {
                    if !table.drop_primary_key() {
                        warn!(table = %table.name, "DROP PRIMARY KEY on a table without one");
                    }
                }
                AlterOperation::RenameConstraint { from, to } => {
                    if !table.rename_constraint(&from, &to) {
                        warn!(table = %table.name, constraint = %from, "RENAME CONSTRAINT on a constraint that is not in the schema");
                    }
                }
                AlterOperation::RenameTable { to } => {
                    if self.schema.tables.contains_key(&to) {
                        warn!(from = %table.name, to = %to, "Renaming over an existing table");
                    }
                    retarget_table(&mut self.schema, &table.name, &to);
                    retarget_self(&mut table, &to);
                    table.name = to;
                }
            }
        }

        self.schema.tables.insert(table.name.clone(), table);
        Ok(())
    }

    fn table_mut(&mut self, name: &str, label: &str) -> Result<&mut Table, BuildError> {
        self.schema
            .tables
            .get_mut(name)
            .ok_or_else(|| unknown_table(name, label))
    }
}

fn unknown_table(table: &str, statement: &str) -> BuildError {
    BuildError::UnknownTable {
        table: table.to_string(),
        statement: statement.to_string(),
    }
}

fn unknown_column(table: &str, column: &str, statement: &str) -> BuildError {
    BuildError::UnknownColumn {
        table: table.to_string(),
        column: column.to_string(),
        statement: statement.to_string(),
    }
}

fn column_mut<'t>(table: &'t mut Table, name: &str, label: &str) -> Result<&'t mut Column, BuildError> {
    let table_name = table.name.clone();
    table
        .columns
        .get_mut(name)
        .ok_or_else(|| unknown_column(&table_name, name, label))
}

/// Insert a column, then apply its inline constraints
fn add_column(table: &mut Table, spec: ColumnSpec, order: usize, label: &str) -> Result<(), BuildError> {
    let column = Column::new(spec.name.clone(), spec.logical_type)
        .with_type_sql(spec.type_sql)
        .with_nullable(spec.nullable)
        .with_default(spec.has_default)
        .with_order(order);
    table.columns.insert(spec.name, column);

    for constraint in spec.constraints {
        add_constraint(table, constraint, label)?;
    }
    Ok(())
}

/// Append a constraint, keeping indexes and nullability in step
fn add_constraint(table: &mut Table, constraint: ConstraintSpec, label: &str) -> Result<(), BuildError> {
    match constraint {
        ConstraintSpec::PrimaryKey { name, columns } => {
            for column in &columns {
                column_mut(table, column, label)?.nullable = false;
            }
            table.add_constraint(ConstraintKind::Primary, name, columns);
        }
        ConstraintSpec::Unique { name, columns } => {
            table.add_constraint(ConstraintKind::Unique, name, columns);
        }
        ConstraintSpec::ForeignKey {
            name,
            columns,
            table: target,
            table_columns,
        } => {
            table.references.push(Reference {
                name,
                columns,
                table: target,
                table_columns,
            });
        }
        ConstraintSpec::Check { name, expr } => {
            table.add_constraint(ConstraintKind::Check, name, vec![expr]);
        }
    }
    Ok(())
}

/// Point foreign keys of other tables at a renamed table
fn retarget_table(schema: &mut Schema, from: &str, to: &str) {
    for table in schema.tables.values_mut() {
        for reference in table.references.iter_mut().filter(|r| r.table == from) {
            reference.table = to.to_string();
        }
    }
}

/// Point a table's own self-references at its new name
fn retarget_self(table: &mut Table, to: &str) {
    let from = table.name.clone();
    for reference in table.references.iter_mut().filter(|r| r.table == from) {
        reference.table = to.to_string();
    }
}

/// Follow a column rename in foreign keys that target it
fn retarget_column(schema: &mut Schema, table: &str, from: &str, to: &str) {
    for other in schema.tables.values_mut() {
        rename_target_columns(&mut other.references, table, from, to);
    }
}

fn rename_target_columns(references: &mut [Reference], table: &str, from: &str, to: &str) {
    for reference in references.iter_mut().filter(|r| r.table == table) {
        for column in reference.table_columns.iter_mut().filter(|c| c.as_str() == from) {
            *column = to.to_string();
        }
    }
}

/// Rebuild every table's inbound reference list from the outbound ones
///
/// Foreign keys declared without target columns resolve to the target's
/// primary key here, once every table is known.
fn link_references(schema: &mut Schema) {
    let primary_keys: BTreeMap<String, Vec<String>> = schema
        .tables
        .iter()
        .map(|(name, table)| {
            let key = table.primary_key().into_iter().map(String::from).collect();
            (name.clone(), key)
        })
        .collect();

    let mut inverse = Vec::new();
    for (name, table) in schema.tables.iter_mut() {
        table.referenced.clear();
        for reference in table.references.iter_mut() {
            if reference.table_columns.is_empty() {
                if let Some(key) = primary_keys.get(&reference.table) {
                    reference.table_columns = key.clone();
                }
            }
            inverse.push((reference.table.clone(), reference.inverse(name)));
        }
    }

    for (target, reference) in inverse {
        match schema.tables.get_mut(&target) {
            Some(table) => table.referenced.push(reference),
            None => warn!(
                table = %reference.table,
                target = %target,
                "Foreign key targets a table that is not in the schema"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use mangosql_core::LogicalType;
    use pretty_assertions::assert_eq;

    fn build(sql: &str) -> Result<Schema, BuildError> {
        let parsed = SqlParser::postgres().parse(sql).unwrap();
        SchemaBuilder::new().build(&parsed.statements)
    }

    const ORDERS: &str = "CREATE TABLE orders (id UUID PRIMARY KEY, name text NOT NULL);";

    #[test]
    fn create_table() {
        let schema = build(ORDERS).unwrap();
        let orders = schema.table("orders").unwrap();

        assert_eq!(orders.columns.len(), 2);
        assert_eq!(orders.column("id").unwrap().logical_type, LogicalType::Uuid);
        assert_eq!(orders.column("name").unwrap().logical_type, LogicalType::String);
        assert_eq!(orders.column("name").unwrap().order, 2);
        assert_eq!(orders.constraints.len(), 1);
        assert_eq!(orders.constraints[0].kind, ConstraintKind::Primary);
        assert_eq!(orders.indexes.len(), 1);
        assert_eq!(orders.indexes[0].columns, vec!["id"]);
    }

    #[test]
    fn unique_column_and_table_constraints() {
        let schema = build(
            "CREATE TABLE orders (id UUID PRIMARY KEY, name text NOT NULL UNIQUE, UNIQUE (id, name));",
        )
        .unwrap();
        let orders = schema.table("orders").unwrap();

        assert_eq!(orders.constraints.len(), 3);
        assert_eq!(orders.constraints[1].kind, ConstraintKind::Unique);
        assert_eq!(orders.constraints[1].columns, vec!["name"]);
        assert_eq!(orders.constraints[2].columns, vec!["id", "name"]);
        assert_eq!(orders.indexes.len(), 3);
    }

    #[test]
    fn add_and_drop_constraint() {
        let sql = format!(
            "{}\nALTER TABLE orders ADD CONSTRAINT uq_order UNIQUE (id, name);",
            ORDERS
        );
        let schema = build(&sql).unwrap();
        let orders = schema.table("orders").unwrap();
        assert_eq!(orders.constraints[1].kind, ConstraintKind::Unique);
        assert_eq!(orders.constraints[1].columns, vec!["id", "name"]);
        assert_eq!(orders.indexes.len(), 2);

        let schema = build(&format!("{}\nALTER TABLE orders DROP CONSTRAINT uq_order;", sql)).unwrap();
        let orders = schema.table("orders").unwrap();
        assert_eq!(orders.constraints.len(), 1);
        assert_eq!(orders.indexes.len(), 1);
    }

    #[test]
    fn table_primary_key_forces_not_null() {
        let schema = build("CREATE TABLE tags (id integer, label text, PRIMARY KEY (id));").unwrap();
        let tags = schema.table("tags").unwrap();
        assert!(!tags.column("id").unwrap().nullable);
        assert!(tags.column("label").unwrap().nullable);
        assert_eq!(tags.primary_key(), vec!["id"]);
    }

    #[test]
    fn create_index() {
        let schema = build(&format!(
            "{}\nCREATE INDEX orders_name_idx ON orders (name);\nCREATE UNIQUE INDEX orders_name_key ON orders (name);",
            ORDERS
        ))
        .unwrap();
        let orders = schema.table("orders").unwrap();

        assert_eq!(orders.indexes.len(), 3);
        assert_eq!(orders.constraints.len(), 2);
        assert_eq!(orders.constraints[1].name, "orders_name_key");
    }

    #[test]
    fn inline_and_altered_references() {
        let schema = build(&format!(
            "{}\nCREATE TABLE order_items (id UUID PRIMARY KEY, order_id UUID REFERENCES orders(id), parent_id UUID);\n\
             ALTER TABLE order_items ADD CONSTRAINT fk_parent FOREIGN KEY (parent_id) REFERENCES orders(id);",
            ORDERS
        ))
        .unwrap();
        let items = schema.table("order_items").unwrap();

        assert_eq!(items.references.len(), 2);
        assert_eq!(items.references[0].columns, vec!["order_id"]);
        assert_eq!(items.references[0].table, "orders");
        assert_eq!(items.references[0].table_columns, vec!["id"]);
        assert_eq!(items.references[1].name, "fk_parent");

        let orders = schema.table("orders").unwrap();
        assert_eq!(orders.referenced.len(), 2);
        assert_eq!(orders.referenced[0].table, "order_items");
        assert_eq!(orders.referenced[0].columns, vec!["id"]);
        assert_eq!(orders.referenced[0].table_columns, vec!["order_id"]);
    }

    #[test]
    fn forward_reference_without_columns() {
        let schema = build(
            "CREATE TABLE items (id integer PRIMARY KEY, owner_id integer REFERENCES owners);\n\
             CREATE TABLE owners (id integer PRIMARY KEY);",
        )
        .unwrap();

        assert_eq!(schema.table("items").unwrap().references[0].table_columns, vec!["id"]);
        assert_eq!(schema.table("owners").unwrap().referenced.len(), 1);
    }

    #[test]
    fn rename_table() {
        let schema = build(&format!(
            "{}\nCREATE TABLE items (id UUID, order_id UUID REFERENCES orders(id));\nALTER TABLE orders RENAME TO new_orders;",
            ORDERS
        ))
        .unwrap();

        assert!(schema.table("orders").is_none());
        let renamed = schema.table("new_orders").unwrap();
        assert_eq!(renamed.name, "new_orders");
        assert!(renamed.column("name").is_some());
        assert_eq!(renamed.order, 1);
        assert_eq!(schema.table("items").unwrap().references[0].table, "new_orders");
        assert_eq!(renamed.referenced.len(), 1);
    }

    #[test]
    fn drop_table() {
        let schema = build(&format!("{}\nDROP TABLE orders;", ORDERS)).unwrap();
        assert!(schema.tables.is_empty());

        let schema = build("DROP TABLE IF EXISTS orders;").unwrap();
        assert!(schema.tables.is_empty());
    }

    #[test]
    fn alter_columns() {
        let schema = build(&format!(
            "{}\nALTER TABLE orders ADD COLUMN created_at TIMESTAMP;\n\
             ALTER TABLE orders ALTER COLUMN name TYPE VARCHAR(255);\n\
             ALTER TABLE orders ALTER COLUMN created_at SET NOT NULL;\n\
             ALTER TABLE orders ALTER COLUMN created_at SET DEFAULT now();",
            ORDERS
        ))
        .unwrap();
        let orders = schema.table("orders").unwrap();

        let created_at = orders.column("created_at").unwrap();
        assert_eq!(created_at.logical_type, LogicalType::Timestamp);
        assert_eq!(created_at.order, 3);
        assert!(!created_at.nullable);
        assert!(created_at.has_default);

        let name = orders.column("name").unwrap();
        assert_eq!(name.logical_type, LogicalType::Varchar);
        assert!(!name.nullable);
        assert_eq!(name.order, 2);
    }

    #[test]
    fn rename_and_drop_column() {
        let schema = build(&format!(
            "{}\nALTER TABLE orders RENAME COLUMN name TO new_name;",
            ORDERS
        ))
        .unwrap();
        let orders = schema.table("orders").unwrap();
        assert!(orders.column("name").is_none());
        assert_eq!(orders.column("new_name").unwrap().logical_type, LogicalType::String);

        let schema = build(&format!("{}\nALTER TABLE orders DROP COLUMN name;", ORDERS)).unwrap();
        let orders = schema.table("orders").unwrap();
        assert_eq!(orders.columns.len(), 1);
        assert!(orders.column("name").is_none());
    }

    #[test]
    fn missing_table_and_column_are_errors() {
        let error = build("ALTER TABLE missing ADD COLUMN note text;").unwrap_err();
        assert!(matches!(error, BuildError::UnknownTable { ref table, .. } if table == "missing"));

        let error = build(&format!("{}\nALTER TABLE orders DROP COLUMN missing;", ORDERS)).unwrap_err();
        assert!(matches!(
            error,
            BuildError::UnknownColumn { ref table, ref column, .. } if table == "orders" && column == "missing"
        ));
        assert!(error.to_string().contains("ALTER TABLE orders"));

        let error = build("DROP TABLE missing;").unwrap_err();
        assert!(matches!(error, BuildError::UnknownTable { .. }));

        assert!(build("ALTER TABLE IF EXISTS missing ADD COLUMN note text;").is_ok());
    }

    #[test]
    fn rename_and_drop_index() {
        let schema = build(&format!(
            "{}\nCREATE UNIQUE INDEX orders_name ON orders (name);\n\
             ALTER INDEX orders_name RENAME TO orders_name_key;",
            ORDERS
        ))
        .unwrap();
        let orders = schema.table("orders").unwrap();
        assert!(orders.has_index("orders_name_key"));
        assert_eq!(orders.constraints[1].name, "orders_name_key");

        let schema = build(&format!(
            "{}\nCREATE UNIQUE INDEX orders_name ON orders (name);\nDROP INDEX orders_name;",
            ORDERS
        ))
        .unwrap();
        let orders = schema.table("orders").unwrap();
        assert_eq!(orders.indexes.len(), 1);
        assert_eq!(orders.constraints.len(), 1);
    }

    #[test]
    fn table_order_follows_declarations() {
        let schema = build(
            "CREATE TABLE b (id integer);\nCREATE TABLE a (id integer);\nDROP TABLE b;\nCREATE TABLE c (id integer);",
        )
        .unwrap();
        let names: Vec<&str> = schema.tables_ordered().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(schema.table("c").unwrap().order, 3);
    }
}

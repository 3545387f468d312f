//! DDL generator
//!
//! This module turns a collection of record descriptors into an ordered
//! `CREATE TABLE` script for one dialect. Referenced tables are always
//! created before the tables that point at them.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::schema::mapping::to_sql_type;
use crate::schema::types::{find_descriptor, Dialect, RecordDescriptor};
use crate::utils::naming::quote_identifier;

/// One generated `CREATE TABLE` statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateStatement {
    pub table: String,
    pub sql: String,
}

/// A generated DDL script in dependency order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdlScript {
    pub dialect: Dialect,
    pub statements: Vec<CreateStatement>,
    /// Views in the input collection; they have no DDL of their own
    pub skipped_views: Vec<String>,
}

impl DdlScript {
    /// Table names in creation order
    pub fn tables(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.table.as_str()).collect()
    }

    /// The full script with statements separated by blank lines
    pub fn to_sql(&self) -> String {
        self.statements
            .iter()
            .map(|s| s.sql.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for DdlScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// DDL generator for a single dialect
pub struct DdlGenerator {
    dialect: Dialect,
}

impl DdlGenerator {
    /// Create a new generator
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Generate the script for a collection of descriptors
    pub fn generate(&self, descriptors: &[RecordDescriptor]) -> Result<DdlScript> {
        for descriptor in descriptors {
            descriptor.validate()?;
        }

        let order = dependency_order(descriptors)?;

        let mut statements = Vec::new();
        let mut skipped_views = Vec::new();

        for index in order {
            let descriptor = &descriptors[index];
            if descriptor.view {
                info!(view = %descriptor.name, "Skipping view; views are not generated");
                skipped_views.push(descriptor.name.clone());
                continue;
            }

            let sql = self.create_table_sql_with(descriptor, descriptors)?;
            debug!(table = %descriptor.name, dialect = %self.dialect, sql = %sql, "Generated CREATE TABLE");
            statements.push(CreateStatement {
                table: descriptor.name.clone(),
                sql,
            });
        }

        Ok(DdlScript {
            dialect: self.dialect,
            statements,
            skipped_views,
        })
    }

    /// Generate the `CREATE TABLE` statement for one descriptor
    ///
    /// Only self references can form composite foreign keys here; use
    /// [`create_table_sql_with`](Self::create_table_sql_with) to resolve
    /// other targets.
    pub fn create_table_sql(&self, descriptor: &RecordDescriptor) -> Result<String> {
        self.create_table_sql_with(descriptor, std::slice::from_ref(descriptor))
    }

    /// Generate the `CREATE TABLE` statement for one descriptor, resolving
    /// reference targets in `known`
    pub fn create_table_sql_with(&self, descriptor: &RecordDescriptor, known: &[RecordDescriptor]) -> Result<String> {
        if descriptor.fields.is_empty() {
            return Err(Error::ValidationError(format!(
                "Record '{}' has no fields",
                descriptor.name
            )));
        }

        let q = |name: &str| quote_identifier(name, self.dialect);

        let mut items = Vec::new();

        // Add columns
        for field in &descriptor.fields {
            let mut column = format!(
                "{} {}",
                q(&field.name),
                to_sql_type(field.semantic_type, self.dialect)
            );
            if !field.nullable {
                column.push_str(" NOT NULL");
            }
            if field.unique && !descriptor.is_sole_key(field) {
                column.push_str(" UNIQUE");
            }
            items.push(column);
        }

        // Add primary key
        let pk: Vec<String> = descriptor.primary_key().iter().map(|f| q(&f.name)).collect();
        if !pk.is_empty() {
            items.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }

        // Add foreign keys
        for group in foreign_key_groups(descriptor, known) {
            let table = &group[0].1;
            let columns: Vec<String> = group.iter().map(|(field, _, _)| q(field)).collect();
            let targets: Vec<String> = group.iter().map(|(_, _, column)| q(column)).collect();
            items.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                columns.join(", "),
                q(table),
                targets.join(", ")
            ));
        }

        let body = items
            .iter()
            .map(|item| format!("    {}", item))
            .collect::<Vec<_>>()
            .join(",\n");

        Ok(format!("CREATE TABLE {} (\n{}\n);", q(&descriptor.name), body))
    }
}

/// Generate the DDL text for a collection of descriptors
pub fn generate_sql(descriptors: &[RecordDescriptor], dialect: Dialect) -> Result<String> {
    Ok(DdlGenerator::new(dialect).generate(descriptors)?.to_sql())
}

/// Foreign key clauses of a descriptor as (column, target table, target column) lists
///
/// Contiguous fields pointing at distinct columns of the same table form one
/// composite key only when those columns are exactly the target's primary
/// key. Everything else gets one clause per field.
fn foreign_key_groups(descriptor: &RecordDescriptor, known: &[RecordDescriptor]) -> Vec<Vec<(String, String, String)>> {
    let mut runs: Vec<Vec<(String, String, String)>> = Vec::new();
    let mut previous_was_reference = false;

    for field in &descriptor.fields {
        let Some(reference) = &field.references else {
            previous_was_reference = false;
            continue;
        };

        let entry = (field.name.clone(), reference.table.clone(), reference.column.clone());
        let joins_last = previous_was_reference
            && runs.last().map_or(false, |run| {
                run[0].1.eq_ignore_ascii_case(&reference.table)
                    && !run
                        .iter()
                        .any(|(_, _, column)| column.eq_ignore_ascii_case(&reference.column))
            });

        match runs.last_mut() {
            Some(run) if joins_last => run.push(entry),
            _ => runs.push(vec![entry]),
        }
        previous_was_reference = true;
    }

    let mut groups = Vec::new();
    for run in runs {
        let target = find_descriptor(known, &run[0].1);
        let target_key = target.map(|t| t.primary_key_names()).unwrap_or_default();

        if run.len() > 1 && covers_exactly(&run, &target_key) {
            groups.push(run);
            continue;
        }

        for entry in run {
            if let Some(target) = target {
                if !is_single_key(target, &entry.2) {
                    warn!(
                        table = %descriptor.name,
                        column = %entry.0,
                        target = %format!("{}.{}", entry.1, entry.2),
                        "Referenced column is neither the primary key nor unique; the database may reject this foreign key"
                    );
                }
            }
            groups.push(vec![entry]);
        }
    }

    groups
}

/// True when the run's target columns are the whole of `key`, in any order
fn covers_exactly(run: &[(String, String, String)], key: &[String]) -> bool {
    run.len() == key.len()
        && key
            .iter()
            .all(|k| run.iter().any(|(_, _, column)| column.eq_ignore_ascii_case(k)))
}

/// True when `column` alone identifies a row of `target`
fn is_single_key(target: &RecordDescriptor, column: &str) -> bool {
    let key = target.primary_key_names();
    (key.len() == 1 && key[0].eq_ignore_ascii_case(column))
        || target.field(column).map_or(false, |f| f.unique)
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

/// Depth-first topological order over the reference graph, input order as tie break
fn dependency_order(descriptors: &[RecordDescriptor]) -> Result<Vec<usize>> {
    let index: HashMap<String, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.to_lowercase(), i))
        .collect();

    // Resolve edges once, checking every reference on the way
    let mut edges: Vec<Vec<usize>> = Vec::with_capacity(descriptors.len());
    for (i, descriptor) in descriptors.iter().enumerate() {
        let mut targets = Vec::new();
        for field in &descriptor.fields {
            let Some(reference) = &field.references else {
                continue;
            };

            let unknown = |target: String| Error::UnknownReference {
                table: descriptor.name.clone(),
                column: field.name.clone(),
                target,
            };

            let target = *index
                .get(&reference.table.to_lowercase())
                .ok_or_else(|| unknown(reference.table.clone()))?;
            let target_descriptor = &descriptors[target];
            if target_descriptor.view || target_descriptor.field(&reference.column).is_none() {
                return Err(unknown(reference.to_string()));
            }

            if target == i {
                if !field.nullable {
                    return Err(Error::CyclicSchema {
                        cycle: vec![descriptor.name.clone(), descriptor.name.clone()],
                    });
                }
                continue;
            }
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        edges.push(targets);
    }

    let mut state: Vec<Option<Visit>> = vec![None; descriptors.len()];
    let mut order = Vec::with_capacity(descriptors.len());
    let mut path = Vec::new();

    for start in 0..descriptors.len() {
        visit(start, descriptors, &edges, &mut state, &mut path, &mut order)?;
    }

    Ok(order)
}

fn visit(
    node: usize,
    descriptors: &[RecordDescriptor],
    edges: &[Vec<usize>],
    state: &mut [Option<Visit>],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<()> {
    match state[node] {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&n| descriptors[n].name.clone())
                .collect();
            cycle.push(descriptors[node].name.clone());
            return Err(Error::CyclicSchema { cycle });
        }
        None => {}
    }

    state[node] = Some(Visit::InProgress);
    path.push(node);

    for &target in &edges[node] {
        visit(target, descriptors, edges, state, path, order)?;
    }

    path.pop();
    state[node] = Some(Visit::Done);
    order.push(node);
    Ok(())
}

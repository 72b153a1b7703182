//! DDL generation and schema synchronisation.

use crate::adapter::DbAdapter;
use crate::catalog::{Catalog, FieldInfo, ModelInfo};
use crate::core::Result;
use crate::db::Database;
use std::collections::HashSet;
use std::sync::Arc;

/// `CREATE TABLE` statement of one model.
pub fn create_table_sql(adapter: &dyn DbAdapter, model: &ModelInfo) -> String {
    let columns: Vec<String> = model
        .fields()
        .iter()
        .map(|field| format!("{} {}", field.column, adapter.column_sql_definition(field)))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        adapter.quote_table_name(&model.table),
        columns.join(", ")
    )
}

/// Conventional name of the index on `field`.
pub fn index_name(model: &ModelInfo, field: &FieldInfo) -> String {
    format!("{}_{}_index", model.table, field.column)
}

pub fn create_index_sql(adapter: &dyn DbAdapter, model: &ModelInfo, field: &FieldInfo) -> String {
    format!(
        "CREATE INDEX {} ON {} ({})",
        index_name(model, field),
        adapter.quote_table_name(&model.table),
        field.column
    )
}

pub fn add_column_sql(adapter: &dyn DbAdapter, model: &ModelInfo, field: &FieldInfo) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        adapter.quote_table_name(&model.table),
        field.column,
        adapter.column_sql_definition(field)
    )
}

/// Models ordered so that every relation target precedes the models
/// pointing at it where possible. Relations carry no foreign keys, so
/// models on a relation cycle are emitted in name order once the cycle
/// closes.
pub fn table_order(catalog: &Catalog) -> Result<Vec<Arc<ModelInfo>>> {
    let mut done: HashSet<String> = HashSet::new();
    let mut order = Vec::with_capacity(catalog.len());

    for name in catalog.list_models() {
        let mut visiting = Vec::new();
        visit(catalog, name, &mut visiting, &mut done, &mut order)?;
    }
    Ok(order)
}

fn visit(
    catalog: &Catalog,
    name: &str,
    visiting: &mut Vec<String>,
    done: &mut HashSet<String>,
    order: &mut Vec<Arc<ModelInfo>>,
) -> Result<()> {
    if done.contains(name) {
        return Ok(());
    }
    if visiting.iter().any(|v| v == name) {
        log::debug!("Relation cycle between models: {} -> {}", visiting.join(" -> "), name);
        return Ok(());
    }

    let model = catalog.get_model(name)?;
    visiting.push(name.to_string());
    let mut targets: Vec<&str> = model
        .relation_fields()
        .filter_map(FieldInfo::related_model)
        .filter(|target| *target != name)
        .collect();
    targets.sort_unstable();
    targets.dedup();
    for target in targets {
        visit(catalog, target, visiting, done, order)?;
    }
    visiting.pop();

    done.insert(name.to_string());
    order.push(model.clone());
    Ok(())
}

/// `CREATE TABLE` statements of every model, dependencies first.
pub fn create_tables_sql(adapter: &dyn DbAdapter, catalog: &Catalog) -> Result<Vec<String>> {
    Ok(table_order(catalog)?
        .iter()
        .map(|model| create_table_sql(adapter, model))
        .collect())
}

/// What [`sync_database`] changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub created_tables: Vec<String>,
    pub added_columns: Vec<String>,
    pub created_indexes: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created_tables.is_empty() && self.added_columns.is_empty() && self.created_indexes.is_empty()
    }
}

/// Bring the database schema in line with the catalog: create missing
/// tables, add missing columns and create missing indexes. Existing
/// columns are never altered or dropped.
pub fn sync_database(db: &Database, catalog: &Catalog) -> Result<SyncReport> {
    let adapter = db.adapter();
    let mut report = SyncReport::default();
    let existing = adapter.tables(db)?;

    for model in table_order(catalog)? {
        if !existing.contains(&model.table) {
            db.execute(&create_table_sql(adapter, &model), &[])?;
            log::info!("Created table {} for model {}", model.table, model.name);
            report.created_tables.push(model.table.clone());
        } else {
            let columns = adapter.columns(db, &model.table)?;
            for field in model.fields() {
                if columns.contains_key(&field.column) {
                    continue;
                }
                db.execute(&add_column_sql(adapter, &model, field), &[])?;
                log::info!("Added column {}.{}", model.table, field.column);
                report.added_columns.push(format!("{}.{}", model.table, field.column));
            }
        }

        for field in model.fields().iter().filter(|f| f.index) {
            let name = index_name(&model, field);
            if adapter.index_exists(db, &model.table, &name)? {
                continue;
            }
            db.execute(&create_index_sql(adapter, &model, field), &[])?;
            log::info!("Created index {}", name);
            report.created_indexes.push(name);
        }
    }

    Ok(report)
}

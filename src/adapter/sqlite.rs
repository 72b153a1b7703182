use super::{ColumnData, DbAdapter, OperatorSql, is_primary_key, standard_operator_sql, text_column};
use crate::catalog::FieldInfo;
use crate::condition::Operator;
use crate::core::{DataType, Result, Value};
use crate::db::Database;
use std::collections::{HashMap, HashSet};

/// SQLite has no ILIKE; its LIKE already ignores ASCII case.
pub struct SqliteAdapter;

impl DbAdapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite3"
    }

    fn operator_sql(&self, op: Operator, arg: &Value) -> Result<OperatorSql> {
        standard_operator_sql(op, arg, "LIKE")
    }

    fn type_sql(&self, field: &FieldInfo) -> String {
        if is_primary_key(field) {
            return "INTEGER PRIMARY KEY AUTOINCREMENT".to_string();
        }
        match field.data_type() {
            DataType::Integer => "INTEGER",
            DataType::Float => "REAL",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::DateTime => "DATETIME",
        }
        .to_string()
    }

    /// SQLite only accepts OFFSET after a LIMIT; -1 means no limit.
    fn limit_offset_sql(&self, limit: usize, offset: usize) -> String {
        match (limit, offset) {
            (0, 0) => String::new(),
            (0, offset) => format!("LIMIT -1 OFFSET {}", offset),
            (limit, 0) => format!("LIMIT {}", limit),
            (limit, offset) => format!("LIMIT {} OFFSET {}", limit, offset),
        }
    }

    fn tables(&self, db: &Database) -> Result<HashSet<String>> {
        let rows = db.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            &[],
        )?;
        Ok(text_column(rows))
    }

    fn columns(&self, db: &Database, table: &str) -> Result<HashMap<String, ColumnData>> {
        let rows = db.query(
            "SELECT name, type, \"notnull\", dflt_value FROM pragma_table_info(?)",
            &[Value::from(table)],
        )?;

        let mut res = HashMap::with_capacity(rows.len());
        for row in rows {
            let Some(column_name) = row.first().and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            let column_default = match row.get(3) {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.to_string()),
            };
            res.insert(
                column_name.clone(),
                ColumnData {
                    column_name,
                    data_type: row.get(1).map(Value::to_string).unwrap_or_default(),
                    is_nullable: row.get(2).and_then(Value::as_i64).unwrap_or(0) == 0,
                    column_default,
                },
            );
        }
        Ok(res)
    }

    fn index_exists(&self, db: &Database, table: &str, name: &str) -> Result<bool> {
        let row = db.get(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND name = ?",
            &[Value::from(table), Value::from(name)],
        )?;
        Ok(row.first().and_then(Value::as_i64).unwrap_or(0) > 0)
    }
}

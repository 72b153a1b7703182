use super::{
    ColumnData, DbAdapter, OperatorSql, is_primary_key, rebind_dollar, standard_operator_sql,
    text_column,
};
use crate::catalog::FieldInfo;
use crate::condition::Operator;
use crate::core::{DataType, Result, Value};
use crate::db::Database;
use std::collections::{HashMap, HashSet};

pub struct PostgresAdapter;

impl DbAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn operator_sql(&self, op: Operator, arg: &Value) -> Result<OperatorSql> {
        standard_operator_sql(op, arg, "ILIKE")
    }

    fn type_sql(&self, field: &FieldInfo) -> String {
        if is_primary_key(field) {
            return "serial NOT NULL PRIMARY KEY".to_string();
        }
        match field.data_type() {
            DataType::Integer => "integer",
            DataType::Float => "numeric",
            DataType::Text => "varchar",
            DataType::Boolean => "bool",
            DataType::Date => "date",
            DataType::DateTime => "timestamp without time zone",
        }
        .to_string()
    }

    fn tables(&self, db: &Database) -> Result<HashSet<String>> {
        let rows = db.query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_schema NOT IN ('pg_catalog', 'information_schema')",
            &[],
        )?;
        Ok(text_column(rows))
    }

    fn columns(&self, db: &Database, table: &str) -> Result<HashMap<String, ColumnData>> {
        let rows = db.query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns WHERE table_name = ?",
            &[Value::from(table)],
        )?;

        let mut res = HashMap::with_capacity(rows.len());
        for row in rows {
            let text = |idx: usize| row.get(idx).and_then(Value::as_str).map(str::to_string);
            let Some(column_name) = text(0) else { continue };
            res.insert(
                column_name.clone(),
                ColumnData {
                    column_name,
                    data_type: text(1).unwrap_or_default(),
                    is_nullable: text(2).is_some_and(|s| s.eq_ignore_ascii_case("YES")),
                    column_default: text(3),
                },
            );
        }
        Ok(res)
    }

    fn index_exists(&self, db: &Database, table: &str, name: &str) -> Result<bool> {
        let row = db.get(
            "SELECT COUNT(*) FROM pg_indexes WHERE tablename = ? AND indexname = ?",
            &[Value::from(table), Value::from(name)],
        )?;
        Ok(row.first().and_then(Value::as_i64).unwrap_or(0) > 0)
    }

    fn rebind(&self, sql: &str) -> String {
        rebind_dollar(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_types() {
        let adapter = PostgresAdapter;
        let name = FieldInfo::text("name").required().default("x");
        assert_eq!(adapter.column_sql_definition(&name), "varchar NOT NULL DEFAULT 'x'");
        let manager = FieldInfo::many2one("manager", "HrEmployee");
        assert_eq!(adapter.column_sql_definition(&manager), "integer");
        assert_eq!(adapter.quote_table_name("hr_employee"), "\"hr_employee\"");
    }

    #[test]
    fn test_postgres_ilike_and_rebind() {
        let adapter = PostgresAdapter;
        let op = adapter.operator_sql(Operator::ILike, &Value::from("al")).unwrap();
        assert_eq!(op.sql, "ILIKE ?");
        assert_eq!(adapter.rebind("a = ? AND b = ?"), "a = $1 AND b = $2");
    }
}

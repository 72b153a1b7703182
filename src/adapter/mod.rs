//! Backend adapters: everything that differs between SQL dialects.
//!
//! The query compiler only ever writes `?` placeholders and asks the
//! adapter of the current driver how to spell operators, quote table names
//! and expand set-membership lists. Adapters are looked up by the driver
//! name in a process-wide registry.

pub mod postgres;
pub mod sqlite;

use crate::catalog::{FieldInfo, ID_FIELD};
use crate::condition::Operator;
use crate::core::{ModelError, Result, Value};
use crate::db::Database;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

/// SQL fragment for one operator, to be written after the field, and the
/// arguments its placeholders bind.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSql {
    pub sql: String,
    pub args: Vec<Value>,
}

/// One column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
}

pub trait DbAdapter: Send + Sync {
    /// Driver name this adapter is registered under.
    fn name(&self) -> &'static str;

    fn operator_sql(&self, op: Operator, arg: &Value) -> Result<OperatorSql>;

    /// Column type, including the primary key clause for `id`.
    fn type_sql(&self, field: &FieldInfo) -> String;

    fn column_sql_definition(&self, field: &FieldInfo) -> String {
        let mut res = self.type_sql(field);
        if self.field_is_not_null(field) && !field.primary_key {
            res.push_str(" NOT NULL");
        }
        if field.unique && !field.primary_key {
            res.push_str(" UNIQUE");
        }
        let default = self.field_sql_default(field);
        if !default.is_empty() {
            res.push_str(" DEFAULT ");
            res.push_str(&default);
        }
        res
    }

    /// SQL literal of the field's default, empty when it has none.
    fn field_sql_default(&self, field: &FieldInfo) -> String {
        field
            .default
            .as_ref()
            .map(Value::to_sql_literal)
            .unwrap_or_default()
    }

    fn field_is_not_null(&self, field: &FieldInfo) -> bool {
        field.required || field.primary_key
    }

    fn quote_table_name(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn tables(&self, db: &Database) -> Result<HashSet<String>>;

    fn columns(&self, db: &Database, table: &str) -> Result<HashMap<String, ColumnData>>;

    fn index_exists(&self, db: &Database, table: &str, name: &str) -> Result<bool>;

    /// `LIMIT`/`OFFSET` tail of a select; zero means unset.
    fn limit_offset_sql(&self, limit: usize, offset: usize) -> String {
        let mut parts = Vec::new();
        if limit > 0 {
            parts.push(format!("LIMIT {}", limit));
        }
        if offset > 0 {
            parts.push(format!("OFFSET {}", offset));
        }
        parts.join(" ")
    }

    /// Turn the compiler's `?` placeholders into the driver's syntax.
    fn rebind(&self, sql: &str) -> String {
        sql.to_string()
    }

    /// Expand every placeholder bound to a list into one placeholder per
    /// element, flattening the arguments accordingly.
    fn expand_placeholders(&self, sql: &str, args: Vec<Value>) -> Result<(String, Vec<Value>)> {
        expand_list_placeholders(sql, args)
    }
}

/// Operator mapping shared by the built-in adapters. Only the keyword of
/// case-insensitive matching differs between them.
pub(crate) fn standard_operator_sql(op: Operator, arg: &Value, ilike: &str) -> Result<OperatorSql> {
    if matches!(arg, Value::List(_)) && !op.is_set_membership() && !op.is_null_check() {
        return Err(ModelError::InvalidExpression(format!(
            "Operator '{}' does not take a list of values",
            op
        )));
    }
    let single = |sql: String| OperatorSql {
        sql,
        args: vec![arg.clone()],
    };
    let wrapped = |sql: String| OperatorSql {
        sql,
        args: vec![Value::Text(format!("%{}%", pattern_text(arg)))],
    };

    let res = match op {
        Operator::Equals => single("= ?".into()),
        Operator::NotEquals => single("!= ?".into()),
        Operator::Lower => single("< ?".into()),
        Operator::LowerOrEqual => single("<= ?".into()),
        Operator::Greater => single("> ?".into()),
        Operator::GreaterOrEqual => single(">= ?".into()),
        Operator::Like => wrapped("LIKE ?".into()),
        Operator::NotLike => wrapped("NOT LIKE ?".into()),
        Operator::ILike => wrapped(format!("{} ?", ilike)),
        Operator::NotILike => wrapped(format!("NOT {} ?", ilike)),
        Operator::LikePattern => single("LIKE ?".into()),
        Operator::ILikePattern => single(format!("{} ?", ilike)),
        Operator::In | Operator::NotIn => {
            let list = match arg {
                Value::List(items) => items.clone(),
                other => vec![other.clone()],
            };
            if list.is_empty() {
                return Err(ModelError::InvalidExpression(format!(
                    "Operator '{}' needs at least one value",
                    op
                )));
            }
            let keyword = if op == Operator::In { "IN" } else { "NOT IN" };
            OperatorSql {
                sql: format!("{} (?)", keyword),
                args: vec![Value::List(list)],
            }
        }
        Operator::IsNull => OperatorSql {
            sql: "IS NULL".into(),
            args: Vec::new(),
        },
        Operator::IsNotNull => OperatorSql {
            sql: "IS NOT NULL".into(),
            args: Vec::new(),
        },
    };
    Ok(res)
}

fn pattern_text(arg: &Value) -> String {
    match arg.as_str() {
        Some(s) => s.to_string(),
        None => arg.to_string(),
    }
}

/// Call `f` with the byte offset of every `?` that is not inside a quoted
/// string or identifier.
fn for_each_placeholder(sql: &str, mut f: impl FnMut(usize)) {
    let mut quote: Option<char> = None;
    for (pos, ch) in sql.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '?') => f(pos),
            (None, _) => {}
        }
    }
}

pub(crate) fn expand_list_placeholders(sql: &str, args: Vec<Value>) -> Result<(String, Vec<Value>)> {
    let mut positions = Vec::new();
    for_each_placeholder(sql, |pos| positions.push(pos));

    if positions.len() != args.len() {
        return Err(ModelError::InvalidExpression(format!(
            "Statement has {} placeholders but {} arguments were given",
            positions.len(),
            args.len()
        )));
    }
    if !args.iter().any(|a| matches!(a, Value::List(_))) {
        return Ok((sql.to_string(), args));
    }

    let mut out = String::with_capacity(sql.len() + 16);
    let mut flat = Vec::with_capacity(args.len());
    let mut last = 0;
    for (pos, arg) in positions.into_iter().zip(args) {
        out.push_str(&sql[last..pos]);
        last = pos + 1;
        match arg {
            Value::List(items) => {
                if items.is_empty() {
                    return Err(ModelError::InvalidExpression(
                        "Cannot expand an empty list of values".into(),
                    ));
                }
                out.push_str(&vec!["?"; items.len()].join(", "));
                flat.extend(items);
            }
            other => {
                out.push('?');
                flat.push(other);
            }
        }
    }
    out.push_str(&sql[last..]);
    Ok((out, flat))
}

/// Rewrite `?` placeholders as `$1`, `$2`, ...
pub(crate) fn rebind_dollar(sql: &str) -> String {
    let mut positions = Vec::new();
    for_each_placeholder(sql, |pos| positions.push(pos));

    let mut out = String::with_capacity(sql.len() + positions.len() * 2);
    let mut last = 0;
    for (n, pos) in positions.into_iter().enumerate() {
        out.push_str(&sql[last..pos]);
        out.push_str(&format!("${}", n + 1));
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    out
}

/// First column of every row, as text.
pub(crate) fn text_column(rows: Vec<Vec<Value>>) -> HashSet<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

pub(crate) fn is_primary_key(field: &FieldInfo) -> bool {
    field.primary_key && field.name == ID_FIELD
}

lazy_static! {
    static ref ADAPTERS: RwLock<HashMap<String, Arc<dyn DbAdapter>>> = {
        let mut adapters: HashMap<String, Arc<dyn DbAdapter>> = HashMap::new();
        adapters.insert(PostgresAdapter.name().to_string(), Arc::new(PostgresAdapter));
        adapters.insert(SqliteAdapter.name().to_string(), Arc::new(SqliteAdapter));
        RwLock::new(adapters)
    };
}

/// Register `adapter` under `driver`, replacing any previous one.
pub fn register_adapter(driver: &str, adapter: Arc<dyn DbAdapter>) -> Result<()> {
    let mut adapters = ADAPTERS.write()?;
    log::info!("Registered database adapter for driver '{}'", driver);
    adapters.insert(driver.to_string(), adapter);
    Ok(())
}

pub fn get_adapter(driver: &str) -> Result<Arc<dyn DbAdapter>> {
    let adapters = ADAPTERS.read()?;
    adapters
        .get(driver)
        .cloned()
        .ok_or_else(|| ModelError::UnknownAdapter(driver.to_string()))
}

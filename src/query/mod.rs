//! Query descriptions and their compilation to parameterized SQL.
//!
//! A [`Query`] names a model, a [`Condition`], the fields to project and
//! the usual ordering/paging knobs. [`SqlCompiler`] resolves every field
//! path against the catalog, builds the join graph and renders one
//! statement with `?` placeholders; values never reach the SQL text.

mod joins;

pub use joins::{JoinSet, ResolvedPath, TableJoin, resolve_path};

use crate::adapter::DbAdapter;
use crate::catalog::{Catalog, ID_FIELD, ModelInfo};
use crate::condition::{Condition, FieldPath, Predicate};
use crate::core::{FieldMap, ModelError, Result, SqlParams, Value, log_and_fail};
use std::fmt;
use std::sync::Arc;

/// A compiled statement: SQL text with `?` placeholders plus the
/// positional arguments bound to them.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub args: SqlParams,
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|a| match a {
                    Value::Text(s) => format!("'{}'", s),
                    other => other.to_string(),
                })
                .collect();
            write!(f, " -- [{}]", args.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
struct OrderBy {
    path: FieldPath,
    direction: Option<Direction>,
}

impl OrderBy {
    /// Parse `"field"`, `"field asc"` or `"manager.name DESC"`.
    fn parse(entry: &str) -> Result<Self> {
        let mut tokens = entry.split_whitespace();
        let Some(field) = tokens.next() else {
            return Err(ModelError::InvalidExpression("Empty ORDER BY entry".into()));
        };
        let direction = match tokens.next() {
            None => None,
            Some(dir) if dir.eq_ignore_ascii_case("asc") => Some(Direction::Asc),
            Some(dir) if dir.eq_ignore_ascii_case("desc") => Some(Direction::Desc),
            Some(dir) => {
                return Err(ModelError::InvalidExpression(format!(
                    "Invalid sort direction '{}' in '{}'",
                    dir, entry
                )));
            }
        };
        if tokens.next().is_some() {
            return Err(ModelError::InvalidExpression(format!(
                "Invalid ORDER BY entry '{}'",
                entry
            )));
        }
        Ok(Self {
            path: FieldPath::from(field),
            direction,
        })
    }
}

/// Description of one database operation on a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    model: String,
    cond: Condition,
    fields: Vec<FieldPath>,
    limit: usize,
    offset: usize,
    groups: Vec<FieldPath>,
    orders: Vec<String>,
    distinct: bool,
}

impl Query {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            cond: Condition::new(),
            fields: Vec::new(),
            limit: 0,
            offset: 0,
            groups: Vec::new(),
            orders: Vec::new(),
            distinct: false,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn condition(&self) -> &Condition {
        &self.cond
    }

    pub fn filter(mut self, cond: Condition) -> Self {
        self.cond = cond;
        self
    }

    /// Add `cond` to the current condition, parenthesized and AND-ed.
    pub fn and_filter(mut self, cond: Condition) -> Self {
        if self.cond.is_empty() {
            self.cond = cond;
        } else {
            self.cond = std::mem::take(&mut self.cond).and_cond(cond);
        }
        self
    }

    /// Fields to project, as dotted paths.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fields = fields.into_iter().map(|f| FieldPath::from(f.as_ref())).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn group_by(mut self, field: &str) -> Self {
        self.groups.push(FieldPath::from(field));
        self
    }

    /// Add an ordering, `"field"` or `"field asc|desc"`.
    pub fn order_by(mut self, order: &str) -> Self {
        self.orders.push(order.trim().to_string());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// Compiles one [`Query`] for one backend.
pub struct SqlCompiler<'a> {
    catalog: &'a Catalog,
    adapter: &'a dyn DbAdapter,
    query: &'a Query,
    model: &'a Arc<ModelInfo>,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(catalog: &'a Catalog, adapter: &'a dyn DbAdapter, query: &'a Query) -> Result<Self> {
        let model = catalog.get_model(&query.model).map_err(log_and_fail)?;
        Ok(Self {
            catalog,
            adapter,
            query,
            model,
        })
    }

    fn resolve(&self, path: &FieldPath) -> Result<ResolvedPath<'a>> {
        resolve_path(self.catalog, self.adapter, self.model, path)
    }

    fn table(&self) -> String {
        self.adapter.quote_table_name(&self.model.table)
    }

    /// Projected paths; every field of the model when none were requested.
    fn projection(&self) -> Vec<FieldPath> {
        if self.query.fields.is_empty() {
            self.model
                .fields()
                .iter()
                .map(|f| FieldPath::from(f.name.as_str()))
                .collect()
        } else {
            self.query.fields.clone()
        }
    }

    pub fn select(&self) -> Result<SqlStatement> {
        self.select_paths(&self.projection())
    }

    /// `SELECT COUNT(*)` over the ids the query matches.
    pub fn count(&self) -> Result<SqlStatement> {
        let inner = self.select_paths(&[FieldPath::from(ID_FIELD)])?;
        Ok(SqlStatement {
            sql: format!("SELECT COUNT(*) FROM ({}) foo", inner.sql),
            args: inner.args,
        })
    }

    fn select_paths(&self, fields: &[FieldPath]) -> Result<SqlStatement> {
        let orders = self
            .query
            .orders
            .iter()
            .map(|o| OrderBy::parse(o))
            .collect::<Result<Vec<_>>>()?;

        let mut joins = JoinSet::new();
        let mut columns = Vec::with_capacity(fields.len());
        for path in fields {
            let resolved = self.resolve(path)?;
            joins.extend(&resolved.joins);
            columns.push(format!(
                "{} AS {}",
                resolved.field_sql(),
                self.adapter.quote_table_name(&path.to_string())
            ));
        }
        if columns.is_empty() {
            return Err(ModelError::InvalidExpression(format!(
                "Nothing to select from model '{}'",
                self.model.name
            )));
        }

        for path in self.query.cond.all_field_paths() {
            joins.extend(&self.resolve(path)?.joins);
        }

        let mut groups = Vec::with_capacity(self.query.groups.len());
        for path in &self.query.groups {
            let resolved = self.resolve(path)?;
            joins.extend(&resolved.joins);
            groups.push(resolved.field_sql());
        }

        let mut order_sql = Vec::with_capacity(orders.len());
        for order in &orders {
            let resolved = self.resolve(&order.path)?;
            joins.extend(&resolved.joins);
            order_sql.push(match order.direction {
                None => resolved.field_sql(),
                Some(Direction::Asc) => format!("{} ASC", resolved.field_sql()),
                Some(Direction::Desc) => format!("{} DESC", resolved.field_sql()),
            });
        }

        let (where_sql, args) = self.where_clause()?;

        let mut parts = vec!["SELECT".to_string()];
        if self.query.distinct {
            parts.push("DISTINCT".to_string());
        }
        parts.push(columns.join(", "));
        parts.push("FROM".to_string());
        parts.push(joins.sql());
        if !where_sql.is_empty() {
            parts.push(where_sql);
        }
        if !groups.is_empty() {
            parts.push(format!("GROUP BY {}", groups.join(", ")));
        }
        if !order_sql.is_empty() {
            parts.push(format!("ORDER BY {}", order_sql.join(", ")));
        }
        let tail = self.adapter.limit_offset_sql(self.query.limit, self.query.offset);
        if !tail.is_empty() {
            parts.push(tail);
        }

        Ok(SqlStatement {
            sql: parts.join(" "),
            args,
        })
    }

    /// Storage columns and values of a write payload, in payload order.
    fn write_columns(&self, data: &FieldMap, operation: &'static str) -> Result<(Vec<String>, SqlParams)> {
        if data.is_empty() {
            return Err(log_and_fail(ModelError::EmptyPayload(operation)));
        }
        let mut cols = Vec::with_capacity(data.len());
        let mut vals = Vec::with_capacity(data.len());
        for (name, value) in data.iter() {
            let field = self.model.get_field(name).map_err(log_and_fail)?;
            cols.push(field.column.clone());
            vals.push(value.clone());
        }
        Ok((cols, vals))
    }

    pub fn insert(&self, data: &FieldMap) -> Result<SqlStatement> {
        let (cols, vals) = self.write_columns(data, "insert")?;
        let placeholders = vec!["?"; vals.len()].join(", ");
        Ok(SqlStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                self.table(),
                cols.join(", "),
                placeholders,
                ID_FIELD
            ),
            args: vals,
        })
    }

    pub fn update(&self, data: &FieldMap) -> Result<SqlStatement> {
        let (cols, mut vals) = self.write_columns(data, "update")?;
        let updates: Vec<String> = cols.iter().map(|c| format!("{} = ?", c)).collect();
        let (where_sql, args) = self.write_where_clause()?;

        let mut sql = format!("UPDATE {} SET {}", self.table(), updates.join(", "));
        if !where_sql.is_empty() {
            sql.push(' ');
            sql.push_str(&where_sql);
        }
        vals.extend(args);
        Ok(SqlStatement { sql, args: vals })
    }

    pub fn delete(&self) -> Result<SqlStatement> {
        let (where_sql, args) = self.write_where_clause()?;
        let mut sql = format!("DELETE FROM {}", self.table());
        if !where_sql.is_empty() {
            sql.push(' ');
            sql.push_str(&where_sql);
        }
        Ok(SqlStatement { sql, args })
    }

    /// WHERE clause of an UPDATE or DELETE. UPDATE and DELETE cannot
    /// join, so a condition crossing relations selects the ids instead.
    fn write_where_clause(&self) -> Result<(String, SqlParams)> {
        let mut joins = JoinSet::new();
        for path in self.query.cond.all_field_paths() {
            joins.extend(&self.resolve(path)?.joins);
        }
        if !joins.has_joins() {
            return self.where_clause();
        }

        let (where_sql, args) = self.where_clause()?;
        let id = format!("{}.{}", self.table(), ID_FIELD);
        Ok((
            format!(
                "WHERE {} IN (SELECT {} FROM {} {})",
                id,
                id,
                joins.sql(),
                where_sql
            ),
            args,
        ))
    }

    /// `WHERE ...` with set-membership placeholders expanded, or an empty
    /// string when the condition is empty.
    fn where_clause(&self) -> Result<(String, SqlParams)> {
        let (sql, args) = self.condition_sql(&self.query.cond)?;
        if sql.is_empty() {
            return Ok((String::new(), args));
        }
        self.adapter.expand_placeholders(&format!("WHERE {}", sql), args)
    }

    fn condition_sql(&self, cond: &Condition) -> Result<(String, SqlParams)> {
        let mut parts = Vec::with_capacity(cond.len());
        let mut args = Vec::new();

        for node in cond.nodes() {
            let body = match &node.predicate {
                Predicate::Leaf { path, operator, arg } => {
                    let field = self.resolve(path)?.field_sql();
                    let op = self.adapter.operator_sql(*operator, arg)?;
                    args.extend(op.args);
                    format!("{} {}", field, op.sql)
                }
                Predicate::Nested(sub) => {
                    let (sub_sql, sub_args) = self.condition_sql(sub)?;
                    if sub_sql.is_empty() {
                        continue;
                    }
                    args.extend(sub_args);
                    format!("({})", sub_sql)
                }
            };

            let mut clause = String::new();
            if !parts.is_empty() {
                clause.push_str(if node.is_or { "OR " } else { "AND " });
            }
            if node.is_not {
                clause.push_str("NOT ");
            }
            clause.push_str(&body);
            parts.push(clause);
        }

        Ok((parts.join(" "), args))
    }
}

/// Compile a SELECT of `query` in one call.
pub fn compile_select(catalog: &Catalog, adapter: &dyn DbAdapter, query: &Query) -> Result<SqlStatement> {
    SqlCompiler::new(catalog, adapter, query)?.select()
}

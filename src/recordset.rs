//! Record handles and the session that runs compiled statements.

use crate::catalog::{ID_FIELD, ModelInfo};
use crate::condition::{Condition, FieldPath, Operator};
use crate::core::{DataType, FieldMap, ModelError, Result, Row, Value};
use crate::db::Database;
use crate::environment::Environment;
use crate::query::{Query, SqlCompiler, resolve_path};
use std::fmt;
use std::sync::Arc;

/// A model plus an ordered list of record ids.
///
/// Every method layer receives one as its first argument.
#[derive(Debug, Clone)]
pub struct RecordSet {
    model: Arc<ModelInfo>,
    ids: Vec<i64>,
}

impl RecordSet {
    pub fn new(model: Arc<ModelInfo>, ids: Vec<i64>) -> Self {
        Self { model, ids }
    }

    pub fn model(&self) -> &Arc<ModelInfo> {
        &self.model
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id of a single-record set.
    pub fn id(&self) -> Result<i64> {
        match self.ids.as_slice() {
            [id] => Ok(*id),
            ids => Err(ModelError::InvalidExpression(format!(
                "Expected a single {} record, got {}",
                self.model.name,
                ids.len()
            ))),
        }
    }

    /// Same model, other ids.
    pub fn with_ids(&self, ids: Vec<i64>) -> Self {
        Self {
            model: self.model.clone(),
            ids,
        }
    }

    /// `id IN (ids)`.
    pub fn condition(&self) -> Condition {
        let ids: Vec<Value> = self.ids.iter().map(|id| Value::Integer(*id)).collect();
        Condition::new().and(ID_FIELD, Operator::In, Value::List(ids))
    }

    /// Query over the records of this set.
    pub fn query(&self) -> Query {
        Query::new(self.model.name.clone()).filter(self.condition())
    }
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.model.name == other.model.name && self.ids == other.ids
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.ids.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.model.name, ids.join(", "))
    }
}

/// An environment bound to one database.
pub struct Session<'a> {
    env: &'a Environment,
    db: &'a Database,
}

impl<'a> Session<'a> {
    pub fn new(env: &'a Environment, db: &'a Database) -> Self {
        Self { env, db }
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    pub fn database(&self) -> &'a Database {
        self.db
    }

    pub fn browse(&self, model: &str, ids: Vec<i64>) -> Result<RecordSet> {
        self.env.recordset(model, ids)
    }

    /// Insert one record and return it.
    pub fn create(&self, model: &str, data: &FieldMap) -> Result<RecordSet> {
        let catalog = self.env.catalog()?;
        let query = Query::new(model);
        let stmt = SqlCompiler::new(&catalog, self.db.adapter(), &query)?.insert(data)?;
        let row = self.db.fetch_one(&stmt)?;
        let id = scan_id(&row)?;
        log::debug!("Created {}({})", model, id);
        Ok(RecordSet::new(catalog.get_model(model)?.clone(), vec![id]))
    }

    /// Records matching `query`, in query order.
    pub fn search(&self, query: &Query) -> Result<RecordSet> {
        let catalog = self.env.catalog()?;
        let ids_query = query.clone().fields([ID_FIELD]);
        let stmt = SqlCompiler::new(&catalog, self.db.adapter(), &ids_query)?.select()?;
        let ids = self
            .db
            .fetch(&stmt)?
            .iter()
            .map(scan_id)
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordSet::new(catalog.get_model(query.model())?.clone(), ids))
    }

    pub fn search_count(&self, query: &Query) -> Result<usize> {
        let catalog = self.env.catalog()?;
        let stmt = SqlCompiler::new(&catalog, self.db.adapter(), query)?.count()?;
        let count = scan_id(&self.db.fetch_one(&stmt)?)?;
        usize::try_from(count).map_err(|_| ModelError::TypeMismatch(format!("Invalid row count {}", count)))
    }

    /// Values of `fields` (dotted paths, all model fields when empty) for
    /// every record of `rs`, ordered by id.
    pub fn read(&self, rs: &RecordSet, fields: &[&str]) -> Result<Vec<FieldMap>> {
        if rs.is_empty() {
            return Ok(Vec::new());
        }
        let catalog = self.env.catalog()?;
        let paths: Vec<FieldPath> = if fields.is_empty() {
            rs.model.fields().iter().map(|f| FieldPath::from(f.name.as_str())).collect()
        } else {
            fields.iter().map(|f| FieldPath::from(*f)).collect()
        };

        let types = paths
            .iter()
            .map(|path| {
                resolve_path(&catalog, self.db.adapter(), &rs.model, path).map(|r| r.field.data_type())
            })
            .collect::<Result<Vec<DataType>>>()?;

        let query = rs
            .query()
            .fields(paths.iter().map(ToString::to_string))
            .order_by(ID_FIELD);
        let stmt = SqlCompiler::new(&catalog, self.db.adapter(), &query)?.select()?;

        self.db
            .fetch(&stmt)?
            .into_iter()
            .map(|row| materialize(&paths, &types, row))
            .collect()
    }

    /// Update every record of `rs`; returns the affected row count.
    pub fn write(&self, rs: &RecordSet, data: &FieldMap) -> Result<u64> {
        if rs.is_empty() {
            return Ok(0);
        }
        let catalog = self.env.catalog()?;
        let query = rs.query();
        let stmt = SqlCompiler::new(&catalog, self.db.adapter(), &query)?.update(data)?;
        self.db.run(&stmt)
    }

    /// Delete every record of `rs`; returns the affected row count.
    pub fn unlink(&self, rs: &RecordSet) -> Result<u64> {
        if rs.is_empty() {
            return Ok(0);
        }
        let catalog = self.env.catalog()?;
        let query = rs.query();
        let stmt = SqlCompiler::new(&catalog, self.db.adapter(), &query)?.delete()?;
        self.db.run(&stmt)
    }

    /// Call a method of the model of `rs` with this session's database.
    pub fn call(&self, rs: &RecordSet, method: &str, args: &[Value]) -> Result<Value> {
        self.env.call_with(Some(self.db), rs, method, args)
    }
}

fn scan_id(row: &Row) -> Result<i64> {
    match row.first() {
        Some(value) => DataType::Integer
            .coerce(value.clone())?
            .as_i64()
            .ok_or_else(|| ModelError::TypeMismatch(format!("Cannot scan '{}' as an id", value))),
        None => Err(ModelError::TypeMismatch("Empty row".into())),
    }
}

fn materialize(paths: &[FieldPath], types: &[DataType], row: Row) -> Result<FieldMap> {
    if row.len() != paths.len() {
        return Err(ModelError::TypeMismatch(format!(
            "Row has {} columns, {} fields requested",
            row.len(),
            paths.len()
        )));
    }
    let mut record = FieldMap::new();
    for ((path, data_type), value) in paths.iter().zip(types).zip(row) {
        record.insert(path.to_string(), data_type.coerce(value)?);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldInfo;

    fn partner() -> Arc<ModelInfo> {
        Arc::new(ModelInfo::new("Partner").with_field(FieldInfo::text("name")))
    }

    #[test]
    fn test_singleton_id() {
        let rs = RecordSet::new(partner(), vec![7]);
        assert_eq!(rs.id().unwrap(), 7);
        assert!(rs.with_ids(vec![1, 2]).id().is_err());
        assert!(rs.with_ids(vec![]).id().is_err());
        assert_eq!(rs.to_string(), "Partner(7)");
    }

    #[test]
    fn test_condition_lists_ids() {
        let rs = RecordSet::new(partner(), vec![3, 4]);
        let cond = rs.condition();
        assert_eq!(cond.len(), 1);
        assert_eq!(rs.query().model(), "Partner");
    }

    #[test]
    fn test_materialize_coerces_and_checks_width() {
        let paths = vec![FieldPath::from("id"), FieldPath::from("active")];
        let types = vec![DataType::Integer, DataType::Boolean];
        let record = materialize(&paths, &types, vec![Value::Integer(1), Value::Integer(0)]).unwrap();
        assert_eq!(record.get("active"), Some(&Value::Boolean(false)));

        assert!(materialize(&paths, &types, vec![Value::Integer(1)]).is_err());
        let err = materialize(&paths, &types, vec![Value::from("x"), Value::Integer(0)]).unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn test_scan_id() {
        assert_eq!(scan_id(&vec![Value::from("12")]).unwrap(), 12);
        assert!(scan_id(&vec![]).is_err());
    }
}

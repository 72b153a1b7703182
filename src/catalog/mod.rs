pub mod model_lang;

use crate::core::{log_and_fail, DataType, ModelError, Result, Value};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use model_lang::ModelProgram;

/// Name and storage column of the implicit primary key of every model.
pub const ID_FIELD: &str = "id";

/// Separator between the segments of a field path (`manager.name`).
pub const EXPR_SEP: char = '.';

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// True when `name` can be used as an unquoted SQL identifier.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// `HrEmployee` -> `hr_employee`, `res.partner` -> `res_partner`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch == '.' || ch == '-' || ch == ' ' {
            out.push('_');
            continue;
        }
        if ch.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(DataType),
    /// To-one relation; the column stores the related record's id.
    Many2One { related: String },
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub column: String,
    pub kind: FieldKind,
    pub required: bool,
    pub unique: bool,
    pub index: bool,
    pub primary_key: bool,
    pub default: Option<Value>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            column: to_snake_case(&name),
            name,
            kind: FieldKind::Scalar(data_type),
            required: false,
            unique: false,
            index: false,
            primary_key: false,
            default: None,
        }
    }

    pub fn many2one(name: impl Into<String>, related: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: format!("{}_id", to_snake_case(&name)),
            name,
            kind: FieldKind::Many2One {
                related: related.into(),
            },
            required: false,
            unique: false,
            index: false,
            primary_key: false,
            default: None,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Float)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Text)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, DataType::DateTime)
    }

    fn primary_key() -> Self {
        let mut field = Self::new(ID_FIELD, DataType::Integer);
        field.primary_key = true;
        field.required = true;
        field.unique = true;
        field
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Many2One { .. })
    }

    pub fn related_model(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Many2One { related } => Some(related),
            FieldKind::Scalar(_) => None,
        }
    }

    /// Type of the stored column; relations store an integer id.
    pub fn data_type(&self) -> DataType {
        match &self.kind {
            FieldKind::Scalar(data_type) => *data_type,
            FieldKind::Many2One { .. } => DataType::Integer,
        }
    }
}

/// Metadata of one model: its table and fields.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub table: String,
    fields: Vec<FieldInfo>,
}

impl ModelInfo {
    /// New model with the implicit `id` primary key.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: to_snake_case(&name),
            name,
            fields: vec![FieldInfo::primary_key()],
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Add a field. Declaring `id` again replaces the implicit key.
    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.add_field(field);
        self
    }

    pub fn add_field(&mut self, field: FieldInfo) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Look a field up by name, falling back to its storage column.
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    pub fn get_field(&self, name: &str) -> Result<&FieldInfo> {
        self.field(name).ok_or_else(|| ModelError::UnknownField {
            model: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    fn check(&self) -> Result<()> {
        if !is_identifier(&self.table) {
            return Err(ModelError::InvalidModel(format!(
                "Model '{}': invalid table name '{}'",
                self.name, self.table
            )));
        }

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &self.fields {
            if !is_identifier(&field.name) || !is_identifier(&field.column) {
                return Err(ModelError::InvalidModel(format!(
                    "Model '{}': invalid field '{}' (column '{}')",
                    self.name, field.name, field.column
                )));
            }
            if !names.insert(field.name.as_str()) {
                return Err(ModelError::InvalidModel(format!(
                    "Model '{}': duplicate field '{}'",
                    self.name, field.name
                )));
            }
            if !columns.insert(field.column.as_str()) {
                return Err(ModelError::InvalidModel(format!(
                    "Model '{}': duplicate column '{}'",
                    self.name, field.column
                )));
            }
        }

        match self.field(ID_FIELD) {
            Some(id) if id.column == ID_FIELD && !id.is_relation() => Ok(()),
            _ => Err(ModelError::InvalidModel(format!(
                "Model '{}' must keep an integer '{}' column",
                self.name, ID_FIELD
            ))),
        }
    }
}

/// Catalog of model metadata.
///
/// Copy-on-write: adding a model returns a new catalog and leaves the old
/// one untouched, so a published catalog can be cloned and read without
/// locks.
#[derive(Clone, Default)]
pub struct Catalog {
    models: Arc<HashMap<String, Arc<ModelInfo>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(self, model: ModelInfo) -> Result<Self> {
        model.check()?;
        if self.models.contains_key(&model.name) {
            return Err(ModelError::DuplicateModel(model.name));
        }
        if let Some(other) = self.models.values().find(|m| m.table == model.table) {
            return Err(ModelError::InvalidModel(format!(
                "Model '{}' uses table '{}' already owned by '{}'",
                model.name, model.table, other.name
            )));
        }

        let mut models = (*self.models).clone();
        log::debug!("Declared model {} (table {})", model.name, model.table);
        models.insert(model.name.clone(), Arc::new(model));

        Ok(Self {
            models: Arc::new(models),
        })
    }

    pub fn get_model(&self, name: &str) -> Result<&Arc<ModelInfo>> {
        self.models
            .get(name)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    pub fn get_field(&self, model: &str, field: &str) -> Result<&FieldInfo> {
        self.get_model(model)?.get_field(field)
    }

    /// Target model of a relation field.
    pub fn related_model(&self, field: &FieldInfo) -> Result<&Arc<ModelInfo>> {
        match field.related_model() {
            Some(related) => self.get_model(related),
            None => Err(ModelError::InvalidExpression(format!(
                "Field '{}' is not a relation",
                field.name
            ))),
        }
    }

    pub fn model_exists(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Model names in alphabetical order.
    pub fn list_models(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelInfo>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Check that every relation points at a declared model.
    pub fn validate(&self) -> Result<()> {
        for name in self.list_models() {
            let model = &self.models[name];
            for field in model.relation_fields() {
                let target = field.related_model().unwrap_or_default();
                if !self.models.contains_key(target) {
                    return Err(log_and_fail(ModelError::InvalidModel(format!(
                        "Field '{}.{}' references unknown model '{}'",
                        model.name, field.name, target
                    ))));
                }
            }
        }
        Ok(())
    }
}

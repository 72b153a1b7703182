use super::{is_identifier, Catalog, FieldInfo, ModelInfo, ID_FIELD};
use crate::core::{DataType, ModelError, Result, Value};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelProgram {
    pub models: Vec<ModelDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDecl {
    pub name: String,
    pub table: Option<String>,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    pub index: bool,
    pub column: Option<String>,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(DataType),
    Relation { target: String },
}

impl ModelProgram {
    /// Parse model definitions.
    ///
    /// Syntax:
    /// ```text
    /// model HrDepartment {
    ///   name: text required
    /// }
    ///
    /// model HrEmployee table hr_employee {
    ///   name: text required index
    ///   department: HrDepartment required
    ///   manager: HrEmployee
    ///   active: bool default=true
    /// }
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let mut models = Vec::new();
        let mut current: Option<ModelDecl> = None;

        for (line_idx, raw_line) in input.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = strip_comment(raw_line).trim();

            if line.is_empty() {
                continue;
            }

            if let Some(active) = current.as_mut() {
                if line == "}" {
                    if let Some(finished) = current.take() {
                        models.push(finished);
                    }
                    continue;
                }

                let field = parse_field(line, line_no)?;
                active.fields.push(field);
                continue;
            }

            current = Some(parse_model_header(line, line_no)?);
        }

        if let Some(unclosed) = current {
            return Err(ModelError::ParseError(format!(
                "Unclosed model '{}' (missing closing '}}')",
                unclosed.name
            )));
        }

        if models.is_empty() {
            return Err(ModelError::ParseError(
                "Model program is empty; add at least one model".into(),
            ));
        }

        Ok(Self { models })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    /// Build the model metadata, checking relation targets against the
    /// program itself and the models already in `known`.
    pub fn to_models(&self, known: &Catalog) -> Result<Vec<ModelInfo>> {
        let mut declared = HashSet::new();
        for model in &self.models {
            if !declared.insert(model.name.as_str()) {
                return Err(ModelError::InvalidModel(format!(
                    "Model '{}' is declared more than once",
                    model.name
                )));
            }
        }

        let mut result = Vec::with_capacity(self.models.len());
        for decl in &self.models {
            let mut model = ModelInfo::new(&decl.name);
            if let Some(table) = &decl.table {
                model = model.table(table);
            }

            let mut seen = HashSet::new();
            for field in &decl.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(ModelError::InvalidModel(format!(
                        "Model '{}': duplicate field '{}'",
                        decl.name, field.name
                    )));
                }
                if field.name == ID_FIELD {
                    return Err(ModelError::InvalidModel(format!(
                        "Model '{}': '{}' is implicit and cannot be redeclared",
                        decl.name, ID_FIELD
                    )));
                }

                let mut info = match &field.field_type {
                    FieldType::Scalar(data_type) => FieldInfo::new(&field.name, *data_type),
                    FieldType::Relation { target } => {
                        if !declared.contains(target.as_str()) && !known.model_exists(target) {
                            return Err(ModelError::InvalidModel(format!(
                                "Model '{}': relation '{}' references unknown model '{}'",
                                decl.name, field.name, target
                            )));
                        }
                        FieldInfo::many2one(&field.name, target)
                    }
                };
                if let Some(column) = &field.column {
                    info = info.column(column);
                }
                info.required = field.required;
                info.unique = field.unique;
                info.index = field.index;
                info.default = field.default.clone();
                model.add_field(info);
            }

            result.push(model);
        }

        Ok(result)
    }

    /// Register every model of the program into `catalog`.
    pub fn register(&self, catalog: Catalog) -> Result<Catalog> {
        let models = self.to_models(&catalog)?;
        let mut catalog = catalog;
        for model in models {
            catalog = catalog.with_model(model)?;
        }
        Ok(catalog)
    }
}

fn parse_model_header(line: &str, line_no: usize) -> Result<ModelDecl> {
    let Some(rest) = line.strip_prefix("model") else {
        return Err(ModelError::ParseError(format!(
            "Line {}: expected 'model <Name> {{'",
            line_no
        )));
    };

    if !rest
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_whitespace())
    {
        return Err(ModelError::ParseError(format!(
            "Line {}: expected whitespace after 'model'",
            line_no
        )));
    }

    let Some(header) = rest.trim().strip_suffix('{') else {
        return Err(ModelError::ParseError(format!(
            "Line {}: model declaration must end with '{{'",
            line_no
        )));
    };

    let tokens: Vec<&str> = header.split_whitespace().collect();
    let (name, table) = match tokens.as_slice() {
        [name] => (*name, None),
        [name, "table", table] => (*name, Some(*table)),
        _ => {
            return Err(ModelError::ParseError(format!(
                "Line {}: expected 'model <Name> [table <table>] {{'",
                line_no
            )));
        }
    };

    if !is_identifier(name) {
        return Err(ModelError::ParseError(format!(
            "Line {}: invalid model name '{}'",
            line_no, name
        )));
    }
    if let Some(table) = table {
        if !is_identifier(table) {
            return Err(ModelError::ParseError(format!(
                "Line {}: invalid table name '{}'",
                line_no, table
            )));
        }
    }

    Ok(ModelDecl {
        name: name.to_string(),
        table: table.map(str::to_string),
        fields: Vec::new(),
    })
}

fn parse_field(line: &str, line_no: usize) -> Result<FieldDecl> {
    let line = line.trim_end_matches(',').trim();
    let (name_raw, rhs) = line.split_once(':').ok_or_else(|| {
        ModelError::ParseError(format!(
            "Line {}: expected field format '<name>: <type> [modifiers]'",
            line_no
        ))
    })?;

    let name = name_raw.trim();
    if !is_identifier(name) {
        return Err(ModelError::ParseError(format!(
            "Line {}: invalid field name '{}'",
            line_no, name
        )));
    }

    let mut tokens = rhs.split_whitespace();
    let Some(type_token) = tokens.next() else {
        return Err(ModelError::ParseError(format!(
            "Line {}: field '{}' is missing type",
            line_no, name
        )));
    };

    let field_type = if let Some(data_type) = parse_scalar_type(type_token) {
        FieldType::Scalar(data_type)
    } else if is_identifier(type_token) {
        FieldType::Relation {
            target: type_token.to_string(),
        }
    } else {
        return Err(ModelError::ParseError(format!(
            "Line {}: unknown type '{}'",
            line_no, type_token
        )));
    };

    let mut field = FieldDecl {
        name: name.to_string(),
        field_type,
        required: false,
        unique: false,
        index: false,
        column: None,
        default: None,
    };

    for token in tokens {
        if let Some(column) = token.strip_prefix("column=") {
            if !is_identifier(column) {
                return Err(ModelError::ParseError(format!(
                    "Line {}: invalid column name '{}'",
                    line_no, column
                )));
            }
            field.column = Some(column.to_string());
            continue;
        }

        if let Some(raw) = token.strip_prefix("default=") {
            field.default = Some(parse_default(&field, raw, line_no)?);
            continue;
        }

        match token.to_ascii_lowercase().as_str() {
            "required" | "not_null" => field.required = true,
            "optional" | "nullable" => field.required = false,
            "unique" => field.unique = true,
            "index" => field.index = true,
            other => {
                return Err(ModelError::ParseError(format!(
                    "Line {}: unknown field modifier '{}'",
                    line_no, other
                )));
            }
        }
    }

    Ok(field)
}

fn parse_default(field: &FieldDecl, raw: &str, line_no: usize) -> Result<Value> {
    let data_type = match &field.field_type {
        FieldType::Scalar(data_type) => *data_type,
        FieldType::Relation { .. } => {
            return Err(ModelError::ParseError(format!(
                "Line {}: relation '{}' cannot have a default",
                line_no, field.name
            )));
        }
    };

    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(raw);

    data_type
        .coerce(Value::Text(unquoted.to_string()))
        .map_err(|e| ModelError::ParseError(format!("Line {}: bad default: {}", line_no, e)))
}

fn parse_scalar_type(token: &str) -> Option<DataType> {
    match token.to_ascii_lowercase().as_str() {
        "int" | "integer" | "i64" => Some(DataType::Integer),
        "float" | "double" | "f64" => Some(DataType::Float),
        "text" | "string" | "char" => Some(DataType::Text),
        "bool" | "boolean" => Some(DataType::Boolean),
        "date" => Some(DataType::Date),
        "datetime" | "timestamp" => Some(DataType::DateTime),
        _ => None,
    }
}

fn strip_comment(line: &str) -> &str {
    let line = line.split_once("//").map_or(line, |(head, _)| head);
    line.split_once('#').map_or(line, |(head, _)| head)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
        // departments first
        model HrDepartment {
          name: text required
        }

        model HrEmployee table employee {
          name: text required index
          age: int
          department: HrDepartment required
          manager: HrEmployee
          active: bool default=true
          code: text column=emp_code unique   # badge
        }
    "#;

    #[test]
    fn parse_models_and_register() {
        let program = ModelProgram::parse(SOURCE).unwrap();
        assert_eq!(program.models.len(), 2);
        assert_eq!(program.models[1].table.as_deref(), Some("employee"));

        let catalog = program.register(Catalog::new()).unwrap();
        let emp = catalog.get_model("HrEmployee").unwrap();
        assert_eq!(emp.table, "employee");
        assert_eq!(emp.get_field("department").unwrap().column, "department_id");
        assert!(emp.get_field("department").unwrap().required);
        assert!(!emp.get_field("manager").unwrap().required);
        assert_eq!(emp.get_field("code").unwrap().column, "emp_code");
        assert_eq!(emp.get_field("active").unwrap().default, Some(Value::Boolean(true)));
        assert!(emp.get_field("name").unwrap().index);
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn reject_unknown_relation_target() {
        let program = ModelProgram::parse("model Task {\n project: Project\n}").unwrap();
        let err = program.to_models(&Catalog::new()).unwrap_err();
        assert!(err.to_string().contains("unknown model 'Project'"));
    }

    #[test]
    fn reject_bad_syntax() {
        assert!(ModelProgram::parse("").is_err());
        assert!(ModelProgram::parse("model Task {\n name text\n}").is_err());
        assert!(ModelProgram::parse("model Task {\n name: text\n").is_err());
        assert!(ModelProgram::parse("model Task {\n name: text fancy\n}").is_err());
        assert!(ModelProgram::parse("model Task {\n age: int default=abc\n}").is_err());
    }
}

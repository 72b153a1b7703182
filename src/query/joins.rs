use crate::adapter::DbAdapter;
use crate::catalog::{Catalog, FieldInfo, ID_FIELD, ModelInfo};
use crate::condition::FieldPath;
use crate::core::{ModelError, Result, log_and_fail};
use std::collections::HashSet;

/// Separator between the columns that make up a join alias.
const ALIAS_SEP: &str = "__";

/// One table occurrence in the FROM clause of a compiled query.
///
/// The root table has `joined == false` and is aliased by its own name;
/// every relation hop joins the related table under an alias built from
/// the columns walked so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableJoin {
    /// Quoted table name.
    pub table_name: String,
    /// Quoted alias.
    pub alias: String,
    pub joined: bool,
    pub inner_join: bool,
    /// Column of this table matched by the join (`id`).
    pub own_field: String,
    /// Column of the previous table holding the foreign key.
    pub other_field: String,
    /// Quoted alias of the previous table.
    pub other_alias: String,
}

impl TableJoin {
    fn root(adapter: &dyn DbAdapter, model: &ModelInfo) -> Self {
        let quoted = adapter.quote_table_name(&model.table);
        Self {
            table_name: quoted.clone(),
            alias: quoted,
            joined: false,
            inner_join: false,
            own_field: String::new(),
            other_field: String::new(),
            other_alias: String::new(),
        }
    }

    pub fn sql(&self) -> String {
        if !self.joined {
            return self.table_name.clone();
        }
        format!(
            "{} {} AS {} ON {}.{} = {}.{}",
            if self.inner_join { "INNER JOIN" } else { "LEFT JOIN" },
            self.table_name,
            self.alias,
            self.other_alias,
            self.other_field,
            self.alias,
            self.own_field
        )
    }
}

/// A field path walked from the root model.
#[derive(Debug, Clone)]
pub struct ResolvedPath<'a> {
    /// Root table first, then one join per relation hop.
    pub joins: Vec<TableJoin>,
    /// Field at the end of the path.
    pub field: &'a FieldInfo,
}

impl ResolvedPath<'_> {
    /// `"alias".column` of the final field.
    pub fn field_sql(&self) -> String {
        let alias = self.joins.last().map(|j| j.alias.as_str()).unwrap_or_default();
        format!("{}.{}", alias, self.field.column)
    }
}

/// Walk `path` from `root`, producing one join per relation hop.
///
/// Every segment but the last must be a many-to-one relation; the join it
/// produces is INNER when that relation is required and LEFT otherwise.
/// Segments may be given as field names or storage columns.
pub fn resolve_path<'a>(
    catalog: &'a Catalog,
    adapter: &dyn DbAdapter,
    root: &'a ModelInfo,
    path: &FieldPath,
) -> Result<ResolvedPath<'a>> {
    let segments = path.segments();
    let Some((last, hops)) = segments.split_last() else {
        return Err(ModelError::InvalidExpression("Empty field path".into()));
    };
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ModelError::InvalidExpression(format!(
            "Malformed field path '{}'",
            path
        )));
    }

    let mut joins = vec![TableJoin::root(adapter, root)];
    let mut current: &ModelInfo = root;
    let mut alias = root.table.clone();

    for segment in hops {
        let field = current.get_field(segment).map_err(log_and_fail)?;
        if !field.is_relation() {
            return Err(ModelError::InvalidExpression(format!(
                "Cannot follow '{}' in '{}': '{}.{}' is not a relation",
                segment, path, current.name, field.name
            )));
        }
        let related = catalog.related_model(field)?;

        alias = format!("{}{}{}", alias, ALIAS_SEP, field.column);
        let other_alias = joins.last().map(|j| j.alias.clone()).unwrap_or_default();
        joins.push(TableJoin {
            table_name: adapter.quote_table_name(&related.table),
            alias: adapter.quote_table_name(&alias),
            joined: true,
            inner_join: field.required,
            own_field: ID_FIELD.to_string(),
            other_field: field.column.clone(),
            other_alias,
        });
        current = &**related;
    }

    let field = current.get_field(last).map_err(log_and_fail)?;
    Ok(ResolvedPath { joins, field })
}

/// Joins of several paths, one per alias, in first-seen order.
#[derive(Debug, Default)]
pub struct JoinSet {
    seen: HashSet<String>,
    joins: Vec<TableJoin>,
}

impl JoinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, joins: &[TableJoin]) {
        for join in joins {
            if self.seen.insert(join.alias.clone()) {
                self.joins.push(join.clone());
            }
        }
    }

    pub fn joins(&self) -> &[TableJoin] {
        &self.joins
    }

    /// Whether any relation hop is needed beyond the root table.
    pub fn has_joins(&self) -> bool {
        self.joins.iter().any(|j| j.joined)
    }

    /// The FROM clause body.
    pub fn sql(&self) -> String {
        self.joins
            .iter()
            .map(TableJoin::sql)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

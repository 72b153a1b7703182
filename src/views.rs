//! Registry of UI view records.
//!
//! Views are opaque records (`arch` is not interpreted here) registered by
//! id and kept ordered by priority per model.

use crate::core::{ModelError, Result, log_and_fail};
use lazy_static::lazy_static;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

lazy_static! {
    static ref GLOBAL_VIEWS: ViewsCollection = ViewsCollection::new();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Tree,
    List,
    Form,
    Graph,
    Calendar,
    Diagram,
    Gantt,
    Kanban,
    Search,
    Qweb,
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tree => "tree",
            Self::List => "list",
            Self::Form => "form",
            Self::Graph => "graph",
            Self::Calendar => "calendar",
            Self::Diagram => "diagram",
            Self::Gantt => "gantt",
            Self::Kanban => "kanban",
            Self::Search => "search",
            Self::Qweb => "qweb",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InheritanceMode {
    #[default]
    Primary,
    Extension,
}

fn default_priority() -> u8 {
    16
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub model: String,
    #[serde(rename = "type")]
    pub view_type: ViewType,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub arch: String,
    /// Id of the view this one extends.
    #[serde(default)]
    pub inherit_id: Option<String>,
    #[serde(default)]
    pub field_parent: String,
    #[serde(default, rename = "mode")]
    pub inheritance_mode: InheritanceMode,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl View {
    pub fn new(id: &str, model: &str, view_type: ViewType) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            model: model.to_string(),
            view_type,
            priority: default_priority(),
            arch: String::new(),
            inherit_id: None,
            field_parent: String::new(),
            inheritance_mode: InheritanceMode::Primary,
            fields: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn arch(mut self, arch: &str) -> Self {
        self.arch = arch.to_string();
        self
    }
}

/// Reference to a view: its id and name. Stored as the id alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewRef {
    pub id: String,
    pub name: String,
}

impl fmt::Display for ViewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.id, self.name)
    }
}

impl Serialize for ViewRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

/// Only the id survives deserialization; resolve the name with
/// [`ViewsCollection::make_view_ref`].
impl<'de> Deserialize<'de> for ViewRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Self {
            id,
            name: String::new(),
        })
    }
}

#[derive(Default)]
struct ViewsInner {
    views: HashMap<String, Arc<View>>,
    ordered: HashMap<String, Vec<Arc<View>>>,
}

#[derive(Default)]
pub struct ViewsCollection {
    inner: RwLock<ViewsInner>,
}

impl ViewsCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ViewsCollection {
        &GLOBAL_VIEWS
    }

    /// Register a view. A view whose id is already taken is dropped.
    ///
    /// Within a model, views stay sorted by priority; equal priorities keep
    /// registration order.
    /// Register `view`. Returns `false` when a view with the same id is
    /// already registered; the new one is dropped.
    pub fn add_view(&self, view: View) -> Result<bool> {
        let mut inner = self.inner.write()?;
        if inner.views.contains_key(&view.id) {
            log::warn!("View '{}' is already registered, dropping duplicate", view.id);
            return Ok(false);
        }

        let view = Arc::new(view);
        let ordered = inner.ordered.entry(view.model.clone()).or_default();
        let index = ordered.partition_point(|v| v.priority <= view.priority);
        ordered.insert(index, view.clone());
        log::debug!("Registered view {} ({} {})", view.id, view.model, view.view_type);
        inner.views.insert(view.id.clone(), view);
        Ok(true)
    }

    pub fn get_view_by_id(&self, id: &str) -> Option<Arc<View>> {
        self.inner.read().ok()?.views.get(id).cloned()
    }

    /// Lowest-priority view of `view_type` for `model`.
    pub fn first_view_for_model(&self, model: &str, view_type: ViewType) -> Result<Arc<View>> {
        let inner = self.inner.read()?;
        inner
            .ordered
            .get(model)
            .and_then(|views| views.iter().find(|v| v.view_type == view_type))
            .cloned()
            .ok_or_else(|| {
                log_and_fail(ModelError::ViewError(format!(
                    "No {} view for model '{}'",
                    view_type, model
                )))
            })
    }

    /// Views of `model` in priority order.
    pub fn views_for_model(&self, model: &str) -> Vec<Arc<View>> {
        self.inner
            .read()
            .map(|inner| inner.ordered.get(model).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Reference to a registered view, `None` for an unknown id.
    pub fn make_view_ref(&self, id: &str) -> Option<ViewRef> {
        self.get_view_by_id(id).map(|view| ViewRef {
            id: view.id.clone(),
            name: view.name.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.views.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a JSON array of view records; returns how many were new.
    pub fn load_json(&self, json: &str) -> Result<usize> {
        let views: Vec<View> = serde_json::from_str(json)
            .map_err(|e| log_and_fail(ModelError::ViewError(format!("Invalid view records: {}", e))))?;
        let mut count = 0;
        for view in views {
            if self.add_view(view)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let source = std::fs::read_to_string(path)?;
        self.load_json(&source)
    }
}

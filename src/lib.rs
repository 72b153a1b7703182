// ============================================================================
// relmodel Library
// ============================================================================

pub mod adapter;
pub mod catalog;
pub mod condition;
pub mod config;
pub mod core;
pub mod db;
pub mod environment;
pub mod methods;
pub mod query;
pub mod recordset;
pub mod schema;
pub mod views;

// Re-export main types for convenience
pub use core::{DataType, FieldMap, ModelError, Result, Row, Value};
pub use catalog::{Catalog, FieldInfo, ModelInfo, ModelProgram};
pub use condition::{Condition, FieldPath, Operator};
pub use query::{Query, SqlCompiler, SqlStatement};

// Re-export the runtime API
pub use adapter::{DbAdapter, get_adapter, register_adapter};
pub use config::{Config, DatabaseConfig};
pub use db::{Database, SqlExecutor};
pub use environment::Environment;
pub use methods::{LayerId, MethodCall, ParamKind, Signature};
pub use recordset::{RecordSet, Session};
pub use views::{View, ViewRef, ViewType, ViewsCollection};

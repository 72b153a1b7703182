//! The model environment: catalog plus method registry, with a one-way
//! bootstrap transition after which both are read-only.

use crate::catalog::{Catalog, ModelInfo, ModelProgram};
use crate::core::{ModelError, Result, Value, log_and_fail};
use crate::db::Database;
use crate::methods::{LayerFn, LayerId, MethodCall, MethodRegistry, Signature};
use crate::recordset::RecordSet;
use lazy_static::lazy_static;
use std::sync::RwLock;

lazy_static! {
    static ref GLOBAL_ENV: Environment = Environment::new();
}

struct CatalogState {
    catalog: Catalog,
    bootstrapped: bool,
}

pub struct Environment {
    state: RwLock<CatalogState>,
    methods: MethodRegistry,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState {
                catalog: Catalog::new(),
                bootstrapped: false,
            }),
            methods: MethodRegistry::new(),
        }
    }

    /// The process-wide environment.
    pub fn global() -> &'static Environment {
        &GLOBAL_ENV
    }

    pub fn declare_model(&self, model: ModelInfo) -> Result<()> {
        let mut state = self.state.write()?;
        if state.bootstrapped {
            return Err(log_and_fail(ModelError::AlreadyBootstrapped(model.name)));
        }
        let catalog = state.catalog.clone().with_model(model).map_err(log_and_fail)?;
        state.catalog = catalog;
        Ok(())
    }

    /// Declare every model of a model-definition program at once.
    pub fn declare_models(&self, program: &ModelProgram) -> Result<()> {
        let mut state = self.state.write()?;
        if state.bootstrapped {
            let names: Vec<&str> = program.models.iter().map(|m| m.name.as_str()).collect();
            return Err(log_and_fail(ModelError::AlreadyBootstrapped(names.join(", "))));
        }
        let catalog = program
            .register(state.catalog.clone())
            .map_err(log_and_fail)?;
        state.catalog = catalog;
        Ok(())
    }

    /// Snapshot of the catalog. Cheap: models are shared.
    pub fn catalog(&self) -> Result<Catalog> {
        Ok(self.state.read()?.catalog.clone())
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    fn check_model(&self, model: &str) -> Result<()> {
        if self.state.read()?.catalog.model_exists(model) {
            Ok(())
        } else {
            Err(log_and_fail(ModelError::UnknownModel(model.to_string())))
        }
    }

    /// Add a typed layer on top of `model.method`.
    pub fn declare_method<Args, F>(&self, model: &str, method: &str, fnct: F) -> Result<LayerId>
    where
        F: LayerFn<Args>,
    {
        self.check_model(model)?;
        self.methods.declare(model, method, fnct)
    }

    /// Add a layer described by an explicit signature on top of `model.method`.
    pub fn declare_dynamic_method<F>(
        &self,
        model: &str,
        method: &str,
        signature: Signature,
        fnct: F,
    ) -> Result<LayerId>
    where
        F: Fn(&MethodCall<'_>, &RecordSet, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.check_model(model)?;
        self.methods.declare_dynamic(model, method, signature, fnct)
    }

    /// Validate the catalog and freeze models and methods.
    ///
    /// Calling it again is a no-op.
    pub fn bootstrap(&self) -> Result<()> {
        let mut state = self.state.write()?;
        if state.bootstrapped {
            return Ok(());
        }
        state.catalog.validate()?;
        state.bootstrapped = true;
        self.methods.bootstrap()?;
        log::info!("Environment bootstrapped ({} models)", state.catalog.len());
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.state.read().map(|s| s.bootstrapped).unwrap_or(false)
    }

    pub fn recordset(&self, model: &str, ids: Vec<i64>) -> Result<RecordSet> {
        let state = self.state.read()?;
        let model = state.catalog.get_model(model)?;
        Ok(RecordSet::new(model.clone(), ids))
    }

    /// Call `method` on `rs` without a database.
    pub fn call(&self, rs: &RecordSet, method: &str, args: &[Value]) -> Result<Value> {
        self.call_with(None, rs, method, args)
    }

    pub fn call_with(
        &self,
        db: Option<&Database>,
        rs: &RecordSet,
        method: &str,
        args: &[Value],
    ) -> Result<Value> {
        let info = self.methods.lookup(rs.model_name(), method)?;
        MethodCall::dispatch(self, db, info, rs, args)
    }
}

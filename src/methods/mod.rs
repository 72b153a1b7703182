//! Method override chains.
//!
//! Every `(model, method)` pair owns a chain of layers. The most recently
//! declared layer is the top and runs first; a layer delegates to the one
//! below it through [`MethodCall::call_next`]. Layers are identified by a
//! [`LayerId`], so the chain can be walked from whichever layer is
//! executing. Once bootstrapped the registry refuses new layers.

mod signature;

pub use signature::{Callable, LayerFn, Output, Param, ParamKind, Signature};

use crate::core::{ModelError, Result, Value, log_and_fail};
use crate::db::Database;
use crate::environment::Environment;
use crate::recordset::RecordSet;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one registered layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// One registered implementation of a method.
pub struct MethodLayer {
    pub id: LayerId,
    pub model: String,
    pub method: String,
    callable: Callable,
}

impl MethodLayer {
    fn invoke(&self, call: &MethodCall<'_>, rs: &RecordSet, args: &[Value]) -> Result<Value> {
        (self.callable)(call, rs, args)
    }
}

impl fmt::Debug for MethodLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodLayer")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("method", &self.method)
            .finish()
    }
}

/// A method of a model and its chain of layers.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub model: String,
    pub signature: Signature,
    top: LayerId,
    next_layer: HashMap<LayerId, LayerId>,
    layers: HashMap<LayerId, Arc<MethodLayer>>,
}

impl MethodInfo {
    fn new(model: &str, name: &str, signature: Signature, layer: Arc<MethodLayer>) -> Self {
        let top = layer.id;
        Self {
            name: name.to_string(),
            model: model.to_string(),
            signature,
            top,
            next_layer: HashMap::new(),
            layers: HashMap::from([(top, layer)]),
        }
    }

    fn with_layer(&self, layer: Arc<MethodLayer>) -> Self {
        let mut info = self.clone();
        info.next_layer.insert(layer.id, info.top);
        info.top = layer.id;
        info.layers.insert(layer.id, layer);
        info
    }

    pub fn top_layer(&self) -> Result<&Arc<MethodLayer>> {
        self.layer(self.top)
    }

    pub fn layer(&self, id: LayerId) -> Result<&Arc<MethodLayer>> {
        self.layers.get(&id).ok_or_else(|| ModelError::UnknownMethod {
            model: self.model.clone(),
            method: format!("{} ({})", self.name, id),
        })
    }

    /// Layer directly below `id`, `None` at the bottom.
    pub fn next_layer(&self, id: LayerId) -> Option<&Arc<MethodLayer>> {
        self.next_layer.get(&id).and_then(|next| self.layers.get(next))
    }

    /// Layer ids from top to bottom.
    pub fn chain(&self) -> Vec<LayerId> {
        let mut res = vec![self.top];
        let mut current = self.top;
        while let Some(next) = self.next_layer.get(&current) {
            res.push(*next);
            current = *next;
        }
        res
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

type MethodKey = (String, String);

#[derive(Default)]
struct RegistryInner {
    methods: HashMap<MethodKey, Arc<MethodInfo>>,
    by_layer: HashMap<LayerId, MethodKey>,
    bootstrapped: bool,
}

/// All method chains, behind a single read/write latch.
#[derive(Default)]
pub struct MethodRegistry {
    inner: RwLock<RegistryInner>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed layer. Its signature comes from its Rust type.
    pub fn declare<Args, F>(&self, model: &str, method: &str, fnct: F) -> Result<LayerId>
    where
        F: LayerFn<Args>,
    {
        self.declare_layer(model, method, F::signature(), fnct.into_callable())
    }

    /// Register a layer described by an explicit signature.
    pub fn declare_dynamic<F>(&self, model: &str, method: &str, signature: Signature, fnct: F) -> Result<LayerId>
    where
        F: Fn(&MethodCall<'_>, &RecordSet, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.declare_layer(model, method, signature, Arc::new(fnct))
    }

    fn declare_layer(&self, model: &str, method: &str, signature: Signature, callable: Callable) -> Result<LayerId> {
        let mut inner = self.inner.write()?;
        if inner.bootstrapped {
            return Err(log_and_fail(ModelError::AlreadyBootstrapped(format!(
                "{}.{}",
                model, method
            ))));
        }

        let key = (model.to_string(), method.to_string());
        let existing = inner.methods.get(&key).cloned();
        match &existing {
            Some(info) if info.signature != signature => {
                return Err(log_and_fail(ModelError::SignatureMismatch {
                    model: model.to_string(),
                    method: method.to_string(),
                    expected: info.signature.to_string(),
                    received: signature.to_string(),
                }));
            }
            Some(_) => {}
            None => {
                if let Err(reason) = signature.check_shape() {
                    return Err(log_and_fail(ModelError::InvalidSignature {
                        model: model.to_string(),
                        method: method.to_string(),
                        reason,
                    }));
                }
            }
        }

        let layer = Arc::new(MethodLayer {
            id: LayerId::next(),
            model: model.to_string(),
            method: method.to_string(),
            callable,
        });
        let id = layer.id;
        let info = match existing {
            Some(info) => info.with_layer(layer),
            None => MethodInfo::new(model, method, signature, layer),
        };

        log::debug!("Declared {}.{} {} ({} layers)", model, method, id, info.len());
        inner.by_layer.insert(id, key.clone());
        inner.methods.insert(key, Arc::new(info));
        Ok(id)
    }

    pub fn lookup(&self, model: &str, method: &str) -> Result<Arc<MethodInfo>> {
        let inner = self.inner.read()?;
        inner
            .methods
            .get(&(model.to_string(), method.to_string()))
            .cloned()
            .ok_or_else(|| ModelError::UnknownMethod {
                model: model.to_string(),
                method: method.to_string(),
            })
    }

    pub fn has_method(&self, model: &str, method: &str) -> bool {
        self.lookup(model, method).is_ok()
    }

    /// The layer below `layer` in its chain, `None` at the bottom.
    pub fn resolve_next(&self, layer: LayerId) -> Result<Option<Arc<MethodLayer>>> {
        let inner = self.inner.read()?;
        let Some(key) = inner.by_layer.get(&layer) else {
            return Err(ModelError::UnknownMethod {
                model: String::new(),
                method: layer.to_string(),
            });
        };
        Ok(inner
            .methods
            .get(key)
            .and_then(|info| info.next_layer(layer))
            .cloned())
    }

    /// Method names of `model`, sorted.
    pub fn methods_of(&self, model: &str) -> Result<Vec<String>> {
        let inner = self.inner.read()?;
        let mut names: Vec<String> = inner
            .methods
            .keys()
            .filter(|(m, _)| m == model)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Freeze the registry. Returns false when it already was.
    pub fn bootstrap(&self) -> Result<bool> {
        let mut inner = self.inner.write()?;
        if inner.bootstrapped {
            return Ok(false);
        }
        inner.bootstrapped = true;
        log::info!("Method registry bootstrapped ({} methods)", inner.methods.len());
        Ok(true)
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.inner.read().map(|inner| inner.bootstrapped).unwrap_or(false)
    }
}

/// Context handed to an executing layer.
///
/// Carries the identity of that layer, so [`MethodCall::call_next`] knows
/// where in the chain it is.
pub struct MethodCall<'a> {
    env: &'a Environment,
    db: Option<&'a Database>,
    info: Arc<MethodInfo>,
    layer: LayerId,
}

impl<'a> MethodCall<'a> {
    pub(crate) fn new(env: &'a Environment, db: Option<&'a Database>, info: Arc<MethodInfo>, layer: LayerId) -> Self {
        Self { env, db, info, layer }
    }

    /// Run the top layer of `info`.
    pub(crate) fn dispatch(
        env: &'a Environment,
        db: Option<&'a Database>,
        info: Arc<MethodInfo>,
        rs: &RecordSet,
        args: &[Value],
    ) -> Result<Value> {
        let top = info.top_layer()?.clone();
        Self::new(env, db, info, top.id).run(&top, rs, args)
    }

    fn run(&self, layer: &MethodLayer, rs: &RecordSet, args: &[Value]) -> Result<Value> {
        let name = format!("{}.{}", self.info.model, self.info.name);
        self.info.signature.check_args(&name, args)?;
        let res = layer.invoke(self, rs, args)?;
        self.info.signature.check_return(&name, &res)?;
        Ok(res)
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    /// Database of the session the method was called from, if any.
    pub fn database(&self) -> Option<&'a Database> {
        self.db
    }

    pub fn method(&self) -> &MethodInfo {
        &self.info
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Run the layer below the current one.
    pub fn call_next(&self, rs: &RecordSet, args: &[Value]) -> Result<Value> {
        let Some(next) = self.env.methods().resolve_next(self.layer)? else {
            return Err(ModelError::NoNextLayer {
                model: self.info.model.clone(),
                method: self.info.name.clone(),
            });
        };
        let call = Self::new(self.env, self.db, self.info.clone(), next.id);
        call.run(&next, rs, args)
    }

    /// [`call_next`](Self::call_next), converting the result back to the
    /// layer's own return type.
    pub fn next<R: Param>(&self, rs: &RecordSet, args: &[Value]) -> Result<R> {
        R::from_value(self.call_next(rs, args)?)
    }

    /// Call another method, starting from its top layer.
    pub fn call(&self, rs: &RecordSet, method: &str, args: &[Value]) -> Result<Value> {
        let info = self.env.methods().lookup(&rs.model().name, method)?;
        Self::dispatch(self.env, self.db, info, rs, args)
    }
}

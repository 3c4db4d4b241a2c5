// File: src/rpc/mod.rs
//
// RPC dispatch: a descriptor table built at registration time from typed
// method adapters, exposing plain async methods under dotted names without
// per-method transport boilerplate

pub mod params;

pub use params::RpcParams;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};

/// Immutable description of one registered method, built once at
/// registration and served by the introspection endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<String>,
    pub result: String,
    pub takes_context: bool,
    pub returns_result: bool,
}

type MethodFuture = Pin<Box<dyn Future<Output = EngineResult<serde_json::Value>> + Send>>;
type MethodInvoker = Arc<dyn Fn(RequestContext, RpcParams) -> MethodFuture + Send + Sync>;

/// One exposable method: its signature plus the decode-invoke-encode
/// closure. Built through the arity constructors, which capture the handler
/// behind an `Arc` and the parameter/result type names for introspection.
pub struct RpcMethod {
    short_name: String,
    params: Vec<String>,
    result: String,
    invoker: MethodInvoker,
}

impl RpcMethod {
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Method with no wire parameters.
    pub fn nullary<H, R, F, Fut>(name: &str, handler: &Arc<H>, f: F) -> Self
    where
        H: Send + Sync + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<H>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<R>> + Send + 'static,
    {
        let handler = Arc::clone(handler);
        let invoker: MethodInvoker = Arc::new(move |ctx, params| {
            if let Err(error) = params.expect_empty() {
                return Box::pin(std::future::ready(Err(error)));
            }
            let fut = f(Arc::clone(&handler), ctx);
            Box::pin(async move { encode_result(fut.await?) })
        });
        Self {
            short_name: name.to_string(),
            params: Vec::new(),
            result: short_type_name::<R>(),
            invoker,
        }
    }

    /// Method with one parameter; accepts a one-element JSON array or, for
    /// struct-shaped parameters, a bare JSON object.
    pub fn unary<H, P, R, F, Fut>(name: &str, handler: &Arc<H>, f: F) -> Self
    where
        H: Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<H>, RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<R>> + Send + 'static,
    {
        let handler = Arc::clone(handler);
        let invoker: MethodInvoker = Arc::new(move |ctx, params| {
            match params.decode_one::<P>() {
                Ok(param) => {
                    let fut = f(Arc::clone(&handler), ctx, param);
                    Box::pin(async move { encode_result(fut.await?) })
                }
                Err(error) => Box::pin(std::future::ready(Err(error))),
            }
        });
        Self {
            short_name: name.to_string(),
            params: vec![short_type_name::<P>()],
            result: short_type_name::<R>(),
            invoker,
        }
    }

    pub fn binary<H, P1, P2, R, F, Fut>(name: &str, handler: &Arc<H>, f: F) -> Self
    where
        H: Send + Sync + 'static,
        P1: DeserializeOwned + Send + 'static,
        P2: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<H>, RequestContext, P1, P2) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<R>> + Send + 'static,
    {
        let handler = Arc::clone(handler);
        let invoker: MethodInvoker = Arc::new(move |ctx, params| {
            match params.decode_two::<P1, P2>() {
                Ok((p1, p2)) => {
                    let fut = f(Arc::clone(&handler), ctx, p1, p2);
                    Box::pin(async move { encode_result(fut.await?) })
                }
                Err(error) => Box::pin(std::future::ready(Err(error))),
            }
        });
        Self {
            short_name: name.to_string(),
            params: vec![short_type_name::<P1>(), short_type_name::<P2>()],
            result: short_type_name::<R>(),
            invoker,
        }
    }

    pub fn ternary<H, P1, P2, P3, R, F, Fut>(name: &str, handler: &Arc<H>, f: F) -> Self
    where
        H: Send + Sync + 'static,
        P1: DeserializeOwned + Send + 'static,
        P2: DeserializeOwned + Send + 'static,
        P3: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<H>, RequestContext, P1, P2, P3) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<R>> + Send + 'static,
    {
        let handler = Arc::clone(handler);
        let invoker: MethodInvoker = Arc::new(move |ctx, params| {
            match params.decode_three::<P1, P2, P3>() {
                Ok((p1, p2, p3)) => {
                    let fut = f(Arc::clone(&handler), ctx, p1, p2, p3);
                    Box::pin(async move { encode_result(fut.await?) })
                }
                Err(error) => Box::pin(std::future::ready(Err(error))),
            }
        });
        Self {
            short_name: name.to_string(),
            params: vec![
                short_type_name::<P1>(),
                short_type_name::<P2>(),
                short_type_name::<P3>(),
            ],
            result: short_type_name::<R>(),
            invoker,
        }
    }
}

fn encode_result<R: Serialize>(result: R) -> EngineResult<serde_json::Value> {
    serde_json::to_value(result).map_err(EngineError::from)
}

/// A type exposing methods over RPC.
///
/// Implementations enumerate their method set once; the registry owns the
/// table afterwards. This is the descriptor-table rendition of runtime
/// method reflection: the adapters capture signatures at compile time and
/// the external contract (dotted names, ignore options, array/object param
/// shapes, introspection) stays the same.
pub trait RpcHandler: Send + Sync {
    fn methods(self: Arc<Self>) -> Vec<RpcMethod>;
}

/// Registration options: skip methods by name, or by passing the method
/// values themselves. Both resolve to the same name set and behave
/// identically from the caller's perspective.
#[derive(Default)]
pub struct RegisterOptions {
    ignored: std::collections::HashSet<String>,
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn ignore_methods(mut self, methods: &[RpcMethod]) -> Self {
        self.ignored
            .extend(methods.iter().map(|m| m.short_name.clone()));
        self
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignored.contains(name)
    }
}

struct RegisteredMethod {
    descriptor: MethodDescriptor,
    invoker: MethodInvoker,
}

#[derive(Default)]
struct RegistryInner {
    methods: BTreeMap<String, RegisteredMethod>,
    groups: std::collections::BTreeSet<String>,
}

/// The method table.
///
/// Registration takes a short write lock during startup; after that the
/// registry is read-only and invocation clones the invoker out of a read
/// lock before awaiting anything.
#[derive(Default)]
pub struct RpcRegistry {
    inner: std::sync::RwLock<RegistryInner>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every non-ignored method of `handler` under
    /// `prefix.MethodName`. Duplicate dotted names are an error.
    pub fn register_handler<H: RpcHandler + 'static>(
        &self,
        prefix: &str,
        handler: &Arc<H>,
        options: RegisterOptions,
    ) -> EngineResult<()> {
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Err(EngineError::configuration(format!(
                "invalid RPC prefix '{}'",
                prefix
            )));
        }

        let methods = Arc::clone(handler).methods();
        let mut inner = self.inner.write().expect("registry lock poisoned");

        for method in methods {
            if options.is_ignored(&method.short_name) {
                continue;
            }
            let dotted = format!("{}.{}", prefix, method.short_name);
            if inner.methods.contains_key(&dotted) {
                return Err(EngineError::configuration(format!(
                    "RPC method '{}' is already registered",
                    dotted
                )));
            }
            let descriptor = MethodDescriptor {
                name: dotted.clone(),
                params: method.params.clone(),
                result: method.result.clone(),
                takes_context: true,
                returns_result: true,
            };
            inner.methods.insert(
                dotted,
                RegisteredMethod { descriptor, invoker: method.invoker },
            );
        }

        inner.groups.insert(prefix.to_string());
        Ok(())
    }

    /// Prefix stacker: `registry.group("api").register_handler("game", …)`
    /// yields `api.game.*`.
    pub fn group(&self, prefix: &str) -> RpcGroup<'_> {
        RpcGroup {
            registry: self,
            prefix: prefix.to_string(),
        }
    }

    /// Resolve and invoke a dotted method name.
    pub async fn invoke(
        &self,
        ctx: RequestContext,
        method: &str,
        params: RpcParams,
    ) -> EngineResult<serde_json::Value> {
        ctx.ensure_active()?;
        let invoker = {
            let inner = self.inner.read().expect("registry lock poisoned");
            inner
                .methods
                .get(method)
                .map(|m| Arc::clone(&m.invoker))
                .ok_or_else(|| EngineError::MethodNotFound {
                    method: method.to_string(),
                })?
        };
        invoker(ctx, params).await
    }

    pub fn contains(&self, method: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .methods
            .contains_key(method)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .methods
            .keys()
            .cloned()
            .collect()
    }

    pub fn descriptor(&self, method: &str) -> Option<MethodDescriptor> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .methods
            .get(method)
            .map(|m| m.descriptor.clone())
    }

    pub fn descriptors(&self) -> Vec<MethodDescriptor> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .methods
            .values()
            .map(|m| m.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn groups(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .groups
            .iter()
            .cloned()
            .collect()
    }
}

/// Borrowed view stacking a group prefix onto registrations.
pub struct RpcGroup<'a> {
    registry: &'a RpcRegistry,
    prefix: String,
}

impl<'a> RpcGroup<'a> {
    pub fn register_handler<H: RpcHandler + 'static>(
        &self,
        prefix: &str,
        handler: &Arc<H>,
        options: RegisterOptions,
    ) -> EngineResult<()> {
        let stacked = format!("{}.{}", self.prefix, prefix);
        self.registry.register_handler(&stacked, handler, options)
    }

    pub fn group(&self, prefix: &str) -> RpcGroup<'a> {
        RpcGroup {
            registry: self.registry,
            prefix: format!("{}.{}", self.prefix, prefix),
        }
    }
}

fn short_type_name<T>() -> String {
    simplify_type_name(std::any::type_name::<T>())
}

/// Strip module paths from a type name, including inside generics:
/// `core::option::Option<alloc::string::String>` -> `Option<String>`.
fn simplify_type_name(full: &str) -> String {
    let mut out = String::new();
    let mut segment = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            segment.push(c);
        } else {
            out.push_str(last_segment(&segment));
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(last_segment(&segment));
    out
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

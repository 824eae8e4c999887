use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use skein::rpc::RpcError;
use skein_rpc_service::{Codec, MethodArgs};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

pub type MethodResult = Result<Vec<u8>, RpcError>;

/// The eventual value of one method call.
///
/// Synchronous handlers produce `Ready`; asynchronous handlers produce
/// `Pending`. [`resolve`](Self::resolve) turns either into the encoded result,
/// so nothing downstream ever sees an unfinished computation.
pub enum MethodOutcome {
    Ready(MethodResult),
    Pending(BoxFuture<'static, MethodResult>),
}

impl MethodOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, MethodOutcome::Ready(_))
    }

    pub async fn resolve(self) -> MethodResult {
        match self {
            MethodOutcome::Ready(result) => result,
            MethodOutcome::Pending(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(RpcError::InvocationTarget(panic_message(panic.as_ref()))),
            },
        }
    }
}

type MethodHandler = Arc<dyn Fn(&[Vec<u8>]) -> MethodOutcome + Send + Sync>;

struct MethodEntry {
    param_types: Vec<String>,
    handler: MethodHandler,
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "method panicked".to_string()
    }
}

/// A service implementation exposed as a dispatch table.
///
/// Methods are keyed by name and parameter-type signature, so a name may be
/// overloaded with different argument tuples. Build one with
/// [`ServiceInvoker::builder`]:
///
/// ```rust
/// use skein_rpc_service::{BitcodeCodec, MethodArgs};
/// use skein_rpc_service_endpoint::ServiceInvoker;
///
/// let invoker = ServiceInvoker::builder(BitcodeCodec)
///     .method("add", |(a, b): (i64, i64)| Ok::<_, String>(a + b))
///     .build();
///
/// assert!(invoker.has_method("add"));
/// assert_eq!(invoker.signatures(), vec!["add(i64, i64)".to_string()]);
/// ```
pub struct ServiceInvoker {
    methods: HashMap<String, Vec<MethodEntry>>,
}

impl ServiceInvoker {
    pub fn builder<C: Codec>(codec: C) -> ServiceInvokerBuilder<C> {
        ServiceInvokerBuilder {
            codec,
            methods: HashMap::new(),
        }
    }

    pub fn has_method(&self, method_name: &str) -> bool {
        self.methods.contains_key(method_name)
    }

    /// Every registered `method(type, ...)` signature, sorted.
    pub fn signatures(&self) -> Vec<String> {
        let mut signatures: Vec<String> = self
            .methods
            .iter()
            .flat_map(|(name, entries)| {
                entries
                    .iter()
                    .map(move |entry| format!("{}({})", name, entry.param_types.join(", ")))
            })
            .collect();
        signatures.sort();
        signatures
    }

    /// Looks up the target and starts the call.
    ///
    /// Fails with `MethodNotFound` when no method has that name, and with
    /// `ArgumentMismatch` when the name exists but no overload takes these
    /// parameter types.
    pub fn dispatch(
        &self,
        method_name: &str,
        param_types: &[String],
        param_values: &[Vec<u8>],
    ) -> MethodOutcome {
        let Some(entries) = self.methods.get(method_name) else {
            return MethodOutcome::Ready(Err(RpcError::MethodNotFound(format!(
                "{}({})",
                method_name,
                param_types.join(", ")
            ))));
        };

        let Some(entry) = entries.iter().find(|entry| entry.param_types == param_types) else {
            return MethodOutcome::Ready(Err(RpcError::ArgumentMismatch(format!(
                "{} does not accept ({})",
                method_name,
                param_types.join(", ")
            ))));
        };

        if param_values.len() != param_types.len() {
            return MethodOutcome::Ready(Err(RpcError::ArgumentMismatch(format!(
                "{} declares {} parameter(s) but carries {} value(s)",
                method_name,
                param_types.len(),
                param_values.len()
            ))));
        }

        (entry.handler)(param_values)
    }

    /// Dispatches and waits for the materialized result.
    pub async fn invoke(
        &self,
        method_name: &str,
        param_types: &[String],
        param_values: &[Vec<u8>],
    ) -> MethodResult {
        self.dispatch(method_name, param_types, param_values)
            .resolve()
            .await
    }
}

/// Collects typed method handlers for one service.
pub struct ServiceInvokerBuilder<C: Codec> {
    codec: C,
    methods: HashMap<String, Vec<MethodEntry>>,
}

impl<C: Codec> ServiceInvokerBuilder<C> {
    fn insert(mut self, method_name: &str, param_types: Vec<String>, handler: MethodHandler) -> Self {
        let entries = self.methods.entry(method_name.to_string()).or_default();
        // Re-registering a signature replaces it.
        entries.retain(|entry| entry.param_types != param_types);
        entries.push(MethodEntry {
            param_types,
            handler,
        });
        self
    }

    /// Registers a method that returns its result directly.
    ///
    /// An `Err` from the handler, or a panic inside it, reaches the caller as
    /// `InvocationTarget` with the handler's own message.
    pub fn method<Args, R, E, F>(self, method_name: &str, f: F) -> Self
    where
        Args: MethodArgs,
        R: Serialize + 'static,
        E: Display,
        F: Fn(Args) -> Result<R, E> + Send + Sync + 'static,
    {
        let codec = self.codec.clone();
        let handler: MethodHandler = Arc::new(move |values: &[Vec<u8>]| {
            let args = match Args::decode(&codec, values) {
                Ok(args) => args,
                Err(err) => return MethodOutcome::Ready(Err(err)),
            };

            let result = match catch_unwind(AssertUnwindSafe(|| f(args))) {
                Ok(Ok(value)) => codec.serialize(&value).map_err(RpcError::from),
                Ok(Err(err)) => Err(RpcError::InvocationTarget(err.to_string())),
                Err(panic) => Err(RpcError::InvocationTarget(panic_message(panic.as_ref()))),
            };
            MethodOutcome::Ready(result)
        });

        self.insert(method_name, Args::param_types(), handler)
    }

    /// Registers a method whose result arrives later.
    ///
    /// The returned future is awaited by the invoker; callers only ever
    /// receive its value.
    pub fn method_async<Args, R, E, F, Fut>(self, method_name: &str, f: F) -> Self
    where
        Args: MethodArgs,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let codec = self.codec.clone();
        let handler: MethodHandler = Arc::new(move |values: &[Vec<u8>]| {
            let args = match Args::decode(&codec, values) {
                Ok(args) => args,
                Err(err) => return MethodOutcome::Ready(Err(err)),
            };

            let future = match catch_unwind(AssertUnwindSafe(|| f(args))) {
                Ok(future) => future,
                Err(panic) => {
                    return MethodOutcome::Ready(Err(RpcError::InvocationTarget(panic_message(
                        panic.as_ref(),
                    ))));
                }
            };

            let codec = codec.clone();
            MethodOutcome::Pending(Box::pin(async move {
                match future.await {
                    Ok(value) => codec.serialize(&value).map_err(RpcError::from),
                    Err(err) => Err(RpcError::InvocationTarget(err.to_string())),
                }
            }))
        });

        self.insert(method_name, Args::param_types(), handler)
    }

    pub fn build(self) -> ServiceInvoker {
        ServiceInvoker {
            methods: self.methods,
        }
    }
}

use crate::constants::{LOGGING_FILTER_NAME, LOGGING_FILTER_ORDER};
use futures::FutureExt;
use skein::rpc::{RpcError, RpcRequest, RpcResponse};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// A unit of cross-cutting logic wrapped around an invocation.
///
/// A filter either hands the request on with `chain.proceed(request)` (and may
/// act on the response that comes back), or returns a response of its own
/// without calling `proceed`, which ends the chain early.
///
/// ```rust
/// use skein::rpc::{RpcError, RpcRequest, RpcResponse};
/// use skein_rpc_service::{Filter, FilterChain};
///
/// struct RequireToken;
///
/// #[async_trait::async_trait]
/// impl Filter for RequireToken {
///     fn name(&self) -> &str {
///         "require-token"
///     }
///
///     fn order(&self) -> i32 {
///         10
///     }
///
///     async fn filter(
///         &self,
///         request: RpcRequest,
///         chain: FilterChain<'_>,
///     ) -> Result<RpcResponse, RpcError> {
///         if !request.metadata.attachments.contains_key("token") {
///             return Err(RpcError::FilterRejected("missing token".into()));
///         }
///         chain.proceed(request).await
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Position in the chain; lower runs earlier.
    fn order(&self) -> i32 {
        0
    }

    /// Disabled filters are skipped entirely.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn filter(
        &self,
        request: RpcRequest,
        chain: FilterChain<'_>,
    ) -> Result<RpcResponse, RpcError>;
}

/// What the chain calls once every filter has proceeded.
///
/// On the client this sends the request over the network; on the server it
/// dispatches to the service invoker.
#[async_trait::async_trait]
pub trait FilterTerminal: Send + Sync {
    async fn invoke(&self, request: RpcRequest) -> Result<RpcResponse, RpcError>;
}

/// The remainder of a filter chain for one invocation.
///
/// Consumed by `proceed`, so a filter can pass the call on at most once.
pub struct FilterChain<'a> {
    filters: &'a [Arc<dyn Filter>],
    index: usize,
    terminal: &'a dyn FilterTerminal,
}

impl<'a> FilterChain<'a> {
    /// Runs the next enabled filter, or the terminal if none remain.
    pub async fn proceed(mut self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        while let Some(filter) = self.filters.get(self.index) {
            self.index += 1;

            if !filter.is_enabled() {
                continue;
            }

            let next = FilterChain {
                filters: self.filters,
                index: self.index,
                terminal: self.terminal,
            };

            return match AssertUnwindSafe(filter.filter(request, next))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(filter = filter.name(), "Filter panicked");
                    Err(RpcError::FilterRejected(format!(
                        "{}: filter panicked",
                        filter.name()
                    )))
                }
            };
        }

        self.terminal.invoke(request).await
    }

    /// Index of the next filter `proceed` will consider.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Total number of filters in the chain, enabled or not.
    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }
}

/// An ordered set of filters, built once per side from local configuration.
///
/// Filters are kept sorted by ascending `order()`; ties keep registration
/// order.
#[derive(Clone, Default)]
pub struct FilterSet {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.add(Arc::new(filter));
        self
    }

    pub fn add(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
        // Stable sort keeps registration order among equal orders.
        self.filters.sort_by_key(|f| f.order());
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }

    /// Runs `request` through every filter and then `terminal`.
    pub async fn execute(
        &self,
        request: RpcRequest,
        terminal: &dyn FilterTerminal,
    ) -> Result<RpcResponse, RpcError> {
        FilterChain {
            filters: &self.filters,
            index: 0,
            terminal,
        }
        .proceed(request)
        .await
    }
}

pub type FilterFactory = Arc<dyn Fn() -> Arc<dyn Filter> + Send + Sync>;

/// Filter factories addressable by name, resolved once at startup.
#[derive(Clone)]
pub struct FilterRegistry {
    factories: HashMap<String, FilterFactory>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRegistry {
    /// A registry holding the built-in filters.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(LOGGING_FILTER_NAME, || Arc::new(LoggingFilter::default()));
        registry
    }

    /// Adds (or replaces) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Filter> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds an ordered filter set from configured names.
    pub fn build<S: AsRef<str>>(&self, names: &[S]) -> Result<FilterSet, RpcError> {
        let mut set = FilterSet::new();
        for name in names {
            let name = name.as_ref();
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| RpcError::UnknownFilter(name.to_string()))?;
            set.add(factory());
        }
        Ok(set)
    }
}

/// Times every call and logs its outcome.
#[derive(Debug, Clone)]
pub struct LoggingFilter {
    order: i32,
}

impl Default for LoggingFilter {
    fn default() -> Self {
        Self {
            order: LOGGING_FILTER_ORDER,
        }
    }
}

impl LoggingFilter {
    pub fn with_order(order: i32) -> Self {
        Self { order }
    }
}

#[async_trait::async_trait]
impl Filter for LoggingFilter {
    fn name(&self) -> &str {
        LOGGING_FILTER_NAME
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn filter(
        &self,
        request: RpcRequest,
        chain: FilterChain<'_>,
    ) -> Result<RpcResponse, RpcError> {
        let service = request.service_key();
        let signature = request.signature();
        let started = Instant::now();

        let result = chain.proceed(request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

        match &result {
            Ok(response) if response.is_success() => {
                tracing::debug!(%service, %signature, elapsed_ms, "Call succeeded");
            }
            Ok(response) => {
                tracing::debug!(
                    %service,
                    %signature,
                    elapsed_ms,
                    status = ?response.status,
                    "Call answered with error"
                );
            }
            Err(err) => {
                tracing::warn!(%service, %signature, elapsed_ms, error = %err, "Call failed");
            }
        }

        result
    }
}

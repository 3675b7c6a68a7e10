//! Lookup table from function name to handler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::dispatch::Args;
use crate::error::HandlerResult;

/// A boxed async handler.
pub type HandlerFn = Arc<dyn Fn(Args) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Side effect run once a successful reply has been queued for the caller.
pub type AfterReply = Arc<dyn Fn() + Send + Sync>;

/// One registered function: its minimum argument count and callable.
#[derive(Clone)]
pub struct HandlerBinding {
    pub arity: usize,
    pub call: HandlerFn,
    pub after_reply: Option<AfterReply>,
}

/// Maps `Subsystem::operation` names to handlers.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    bindings: HashMap<&'static str, HandlerBinding>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw handler function.
    ///
    /// Registering the same name twice replaces the earlier binding.
    pub fn register(&mut self, func: &'static str, arity: usize, call: HandlerFn) {
        if self
            .bindings
            .insert(
                func,
                HandlerBinding {
                    arity,
                    call,
                    after_reply: None,
                },
            )
            .is_some()
        {
            tracing::warn!(func, "Handler binding replaced");
        }
    }

    /// Register an operation of a shared subsystem.
    ///
    /// `call` receives its own clone of `target` per invocation.
    pub fn bind<H, F, Fut>(&mut self, func: &'static str, arity: usize, target: &Arc<H>, call: F)
    where
        H: Send + Sync + 'static,
        F: Fn(Arc<H>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let target = Arc::clone(target);
        self.register(
            func,
            arity,
            Arc::new(move |args| call(Arc::clone(&target), args).boxed()),
        );
    }

    /// Attach a hook that runs after `func`'s reply is handed to the
    /// connection, for effects that would otherwise race the reply (such as
    /// closing every connection).
    pub fn after_reply<H, F>(&mut self, func: &'static str, target: &Arc<H>, hook: F)
    where
        H: Send + Sync + 'static,
        F: Fn(&H) + Send + Sync + 'static,
    {
        let Some(binding) = self.bindings.get_mut(func) else {
            tracing::warn!(func, "After-reply hook for unbound function ignored");
            return;
        };
        let target = Arc::clone(target);
        binding.after_reply = Some(Arc::new(move || hook(&target)));
    }

    pub fn resolve(&self, func: &str) -> Option<&HandlerBinding> {
        self.bindings.get(func)
    }

    /// Sorted list of every registered function name.
    pub fn func_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.bindings.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

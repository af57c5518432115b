use crate::orchestrator::TaskOrchestrator;
use chatterm_core::ChatError;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;

pub type CallbackResult = Result<(), ChatError>;

pub(crate) type CompleteFn<C, T> =
    Box<dyn FnOnce(&mut C, &mut TaskOrchestrator<C>, T) -> CallbackResult>;
pub(crate) type ErrorFn<C> =
    Box<dyn FnOnce(&mut C, &mut TaskOrchestrator<C>, ChatError) -> CallbackResult>;

/// A background operation plus the callbacks that run on the owning thread
/// once it settles.
///
/// Callbacks receive the owner's context and the orchestrator itself, so a
/// completion handler can schedule follow-up work.
pub struct BackgroundTask<C, T> {
    pub(crate) label: &'static str,
    pub(crate) operation: BoxFuture<'static, Result<T, ChatError>>,
    pub(crate) on_complete: Option<CompleteFn<C, T>>,
    pub(crate) on_error: Option<ErrorFn<C>>,
}

impl<C: 'static, T: Send + 'static> BackgroundTask<C, T> {
    pub fn new<F>(label: &'static str, operation: F) -> Self
    where
        F: Future<Output = Result<T, ChatError>> + Send + 'static,
    {
        Self {
            label,
            operation: operation.boxed(),
            on_complete: None,
            on_error: None,
        }
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&mut C, &mut TaskOrchestrator<C>, T) -> CallbackResult + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&mut C, &mut TaskOrchestrator<C>, ChatError) -> CallbackResult + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }
}

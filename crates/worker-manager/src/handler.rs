//! Task handler and timeout callback types

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

/// Error returned by handlers and timeout callbacks
pub type HandlerError = anyhow::Error;

/// Handler execution result
pub type HandlerResult = Result<(), HandlerError>;

/// Caller-supplied function invoked once per task
pub type TaskHandler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Caller-supplied fallback invoked with a task whose handler timed out
pub type TimeoutCallback<T> = Arc<dyn Fn(T) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure as a [`TaskHandler`]
///
/// ```
/// use async_worker_manager::handler_fn;
///
/// let handler = handler_fn(|task: String| async move {
///     println!("processing {task}");
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<T, F, Fut>(f: F) -> TaskHandler<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |task| Box::pin(f(task)))
}

/// Wrap an async closure as a [`TimeoutCallback`]
pub fn timeout_callback_fn<T, F, Fut>(f: F) -> TimeoutCallback<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |task| Box::pin(f(task)))
}

//! # Middleware chaining
//!
//! A middleware receives the rest of the chain as `next` and returns a replacement that
//! runs its own code before and after calling it. [`chain`] folds the list from the last
//! entry inward, so the first registered middleware is the outermost layer:
//!
//! ```text
//! [A, B] around T:   A.before -> B.before -> T -> B.after -> A.after
//! ```

use crate::context::Context;
use crate::error::DispatchResult;
use crate::handler::{BoxFuture, Handler};
use std::sync::Arc;
use std::time::Instant;

/// The remainder of a chain, down to the handler.
pub type Next<C> = Arc<dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, DispatchResult> + Send + Sync>;

/// Box a closure as a [`Next`].
pub fn next_fn<C, F>(f: F) -> Next<C>
where
    C: Context,
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, DispatchResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub trait Middleware<C>: Send + Sync + 'static {
    fn wrap(&self, next: Next<C>) -> Next<C>;
}

impl<C, F> Middleware<C> for F
where
    F: Fn(Next<C>) -> Next<C> + Send + Sync + 'static,
{
    fn wrap(&self, next: Next<C>) -> Next<C> {
        self(next)
    }
}

/// Compose `middleware` around `terminal`. The first entry ends up outermost.
pub fn chain<C: Context>(terminal: Next<C>, middleware: &[Arc<dyn Middleware<C>>]) -> Next<C> {
    middleware
        .iter()
        .rev()
        .fold(terminal, |next, layer| layer.wrap(next))
}

impl<C: Context> Handler<C> {
    /// The handler as the innermost link of a chain.
    pub fn into_next(self) -> Next<C> {
        next_fn(move |ctx: &mut C| {
            let handler = self.clone();
            Box::pin(async move { handler.serve(ctx).await })
        })
    }
}

/// Middleware written as `async (ctx, next)`.
pub struct FromFn<F> {
    f: Arc<F>,
}

/// Build a middleware from a function taking the context and the rest of the chain.
///
/// ```rust,ignore
/// let auth = from_fn(|ctx: &mut AppContext, next| Box::pin(async move {
///     if ctx.cookie("session").is_err() {
///         ctx.redirect("/login", StatusCode::FOUND);
///         return Ok(());
///     }
///     next(ctx).await
/// }));
/// ```
pub fn from_fn<C, F>(f: F) -> FromFn<F>
where
    C: Context,
    F: for<'a> Fn(&'a mut C, Next<C>) -> BoxFuture<'a, DispatchResult> + Send + Sync + 'static,
{
    FromFn { f: Arc::new(f) }
}

impl<C, F> Middleware<C> for FromFn<F>
where
    C: Context,
    F: for<'a> Fn(&'a mut C, Next<C>) -> BoxFuture<'a, DispatchResult> + Send + Sync + 'static,
{
    fn wrap(&self, next: Next<C>) -> Next<C> {
        let f = self.f.clone();
        next_fn(move |ctx: &mut C| f(ctx, next.clone()))
    }
}

/// Logs every dispatch with its status and latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct Traced;

impl<C: Context> Middleware<C> for Traced {
    fn wrap(&self, next: Next<C>) -> Next<C> {
        next_fn(move |ctx: &mut C| {
            let next = next.clone();
            Box::pin(async move {
                let method = ctx.request().method().clone();
                let path = ctx.uri().path().to_owned();
                let start = Instant::now();

                let result = next(ctx).await;

                let duration = start.elapsed();
                let status = ctx.writer().status().as_u16();
                match &result {
                    Ok(()) => {
                        tracing::info!(%method, %path, status, ?duration, "request served");
                    }
                    Err(err) => {
                        tracing::warn!(
                            %method,
                            %path,
                            stage = err.stage(),
                            error = %err,
                            ?duration,
                            "request failed"
                        );
                    }
                }
                result
            })
        })
    }
}

//! # Handler shapes and their dispatch
//!
//! Four function shapes cover everything a route can do:
//!
//! * [`Page`] returns an optional layout and an optional body
//! * [`Partial`] returns an optional body, no layout (htmx fragments)
//! * [`Endpoint`] writes its own output through the context
//! * [`WebSocket`](crate::websocket::WebSocket) returns an upgrader and a connection callback
//!
//! Returning absent values instead of an error means "nothing to do": dispatch ends
//! without output and without error.

use crate::component::BoxComponent;
use crate::context::Context;
use crate::error::{BoxError, DispatchError, DispatchResult};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for boxed futures borrowed from the request context.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type HandlerResult<T> = Result<T, BoxError>;

type LayoutFn<C> = dyn for<'a> Fn(
        &'a mut C,
        Vec<BoxComponent>,
    ) -> BoxFuture<'a, HandlerResult<Option<BoxComponent>>>
    + Send
    + Sync;

/// Wraps rendered children into a full document.
///
/// Receives zero children when the page had no body.
pub struct Layout<C> {
    wrap: Arc<LayoutFn<C>>,
}

impl<C> Clone for Layout<C> {
    fn clone(&self) -> Self {
        Self {
            wrap: self.wrap.clone(),
        }
    }
}

impl<C: Context> Layout<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut C,
                Vec<BoxComponent>,
            ) -> BoxFuture<'a, HandlerResult<Option<BoxComponent>>>
            + Send
            + Sync
            + 'static,
    {
        Self { wrap: Arc::new(f) }
    }

    pub async fn wrap(
        &self,
        ctx: &mut C,
        children: Vec<BoxComponent>,
    ) -> HandlerResult<Option<BoxComponent>> {
        (self.wrap)(ctx, children).await
    }
}

/// What a page handler produced.
pub struct PageView<C> {
    pub layout: Option<Layout<C>>,
    pub body: Option<BoxComponent>,
}

impl<C> PageView<C> {
    /// Nothing to render.
    pub fn empty() -> Self {
        Self {
            layout: None,
            body: None,
        }
    }

    /// A body rendered on its own.
    pub fn body(body: BoxComponent) -> Self {
        Self {
            layout: None,
            body: Some(body),
        }
    }

    /// A body wrapped in `layout`.
    pub fn with_layout(layout: Layout<C>, body: Option<BoxComponent>) -> Self {
        Self {
            layout: Some(layout),
            body,
        }
    }
}

type PageFn<C> =
    dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<PageView<C>>> + Send + Sync;
type PartialFn<C> =
    dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<Option<BoxComponent>>> + Send + Sync;
type EndpointFn<C> = dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<()>> + Send + Sync;

/// Handler returning a layout and a body.
pub struct Page<C> {
    handler: Arc<PageFn<C>>,
}

/// Handler returning a body meant to replace a fragment of the document.
pub struct Partial<C> {
    handler: Arc<PartialFn<C>>,
}

/// Handler that renders nothing; output goes through the context.
pub struct Endpoint<C> {
    handler: Arc<EndpointFn<C>>,
}

impl<C> Clone for Page<C> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<C> Clone for Partial<C> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<C> Clone for Endpoint<C> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

/// Render `component` into the context's sink under the context's scope.
///
/// Markup defaults to `text/html; charset=utf-8` unless a content type was already set.
async fn render_into<C: Context>(ctx: &mut C, component: &BoxComponent) -> HandlerResult<()> {
    let scope = ctx.scope().clone();
    let writer = ctx.writer();
    if !writer.is_committed() && !writer.headers().contains_key(CONTENT_TYPE) {
        writer.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
    }
    component.render(&scope, writer).await
}

impl<C: Context> Page<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<PageView<C>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Arc::new(f),
        }
    }

    pub async fn serve(&self, ctx: &mut C) -> DispatchResult {
        let PageView { layout, body } = (self.handler)(ctx)
            .await
            .map_err(DispatchError::PageHandler)?;

        let Some(layout) = layout else {
            if let Some(body) = body {
                render_into(ctx, &body)
                    .await
                    .map_err(DispatchError::RenderBody)?;
            }
            return Ok(());
        };

        let children = body.into_iter().collect();
        let wrapped = layout
            .wrap(ctx, children)
            .await
            .map_err(DispatchError::Layout)?;
        if let Some(wrapped) = wrapped {
            render_into(ctx, &wrapped)
                .await
                .map_err(DispatchError::RenderLayout)?;
        }
        Ok(())
    }
}

impl<C: Context> Partial<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<Option<BoxComponent>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Arc::new(f),
        }
    }

    pub async fn serve(&self, ctx: &mut C) -> DispatchResult {
        let content = (self.handler)(ctx)
            .await
            .map_err(DispatchError::PartialHandler)?;
        if let Some(content) = content {
            render_into(ctx, &content)
                .await
                .map_err(DispatchError::RenderBody)?;
        }
        Ok(())
    }
}

impl<C: Context> Endpoint<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<()>> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(f),
        }
    }

    pub async fn serve(&self, ctx: &mut C) -> DispatchResult {
        (self.handler)(ctx)
            .await
            .map_err(DispatchError::EndpointHandler)
    }
}

/// Endpoint that redirects every request to `location`. Never fails.
pub fn redirect<C: Context>(location: impl Into<String>, status: StatusCode) -> Endpoint<C> {
    let location: Arc<str> = location.into().into();
    Endpoint::new(move |ctx: &mut C| {
        let location = location.clone();
        Box::pin(async move {
            ctx.redirect(&location, status);
            Ok(())
        })
    })
}

type ServeFn<C> = dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, DispatchResult> + Send + Sync;

/// A websocket handler with its upgrader type erased.
pub struct ErasedWebSocket<C> {
    serve: Arc<ServeFn<C>>,
}

impl<C> Clone for ErasedWebSocket<C> {
    fn clone(&self) -> Self {
        Self {
            serve: self.serve.clone(),
        }
    }
}

impl<C: Context> ErasedWebSocket<C> {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, DispatchResult> + Send + Sync + 'static,
    {
        Self { serve: Arc::new(f) }
    }

    pub async fn serve(&self, ctx: &mut C) -> DispatchResult {
        (self.serve)(ctx).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Page,
    Partial,
    Endpoint,
    WebSocket,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Page => "page",
            HandlerKind::Partial => "partial",
            HandlerKind::Endpoint => "endpoint",
            HandlerKind::WebSocket => "websocket",
        }
    }
}

/// The closed set of handler shapes, dispatched through one [`serve`](Handler::serve).
pub enum Handler<C> {
    Page(Page<C>),
    Partial(Partial<C>),
    Endpoint(Endpoint<C>),
    WebSocket(ErasedWebSocket<C>),
}

impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        match self {
            Handler::Page(h) => Handler::Page(h.clone()),
            Handler::Partial(h) => Handler::Partial(h.clone()),
            Handler::Endpoint(h) => Handler::Endpoint(h.clone()),
            Handler::WebSocket(h) => Handler::WebSocket(h.clone()),
        }
    }
}

impl<C: Context> Handler<C> {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Page(_) => HandlerKind::Page,
            Handler::Partial(_) => HandlerKind::Partial,
            Handler::Endpoint(_) => HandlerKind::Endpoint,
            Handler::WebSocket(_) => HandlerKind::WebSocket,
        }
    }

    pub async fn serve(&self, ctx: &mut C) -> DispatchResult {
        match self {
            Handler::Page(h) => h.serve(ctx).await,
            Handler::Partial(h) => h.serve(ctx).await,
            Handler::Endpoint(h) => h.serve(ctx).await,
            Handler::WebSocket(h) => h.serve(ctx).await,
        }
    }
}

impl<C> From<Page<C>> for Handler<C> {
    fn from(page: Page<C>) -> Self {
        Handler::Page(page)
    }
}

impl<C> From<Partial<C>> for Handler<C> {
    fn from(partial: Partial<C>) -> Self {
        Handler::Partial(partial)
    }
}

impl<C> From<Endpoint<C>> for Handler<C> {
    fn from(endpoint: Endpoint<C>) -> Self {
        Handler::Endpoint(endpoint)
    }
}

impl<C> From<ErasedWebSocket<C>> for Handler<C> {
    fn from(ws: ErasedWebSocket<C>) -> Self {
        Handler::WebSocket(ws)
    }
}

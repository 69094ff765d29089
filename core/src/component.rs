//! Renderable components.
//!
//! Dispatch treats a component as opaque: it is either present and rendered, or absent.
//! Markup generation itself belongs to whatever templating library produces them.

use crate::context::Scope;
use crate::error::BoxError;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxComponent = Box<dyn Component>;

/// A tree that can be rendered into a response.
#[async_trait]
pub trait Component: Send + Sync {
    async fn render(&self, scope: &Scope, out: &mut dyn ResponseWriter) -> Result<(), BoxError>;
}

#[async_trait]
impl<T: Component + ?Sized> Component for Box<T> {
    async fn render(&self, scope: &Scope, out: &mut dyn ResponseWriter) -> Result<(), BoxError> {
        (**self).render(scope, out).await
    }
}

#[async_trait]
impl<T: Component + ?Sized> Component for Arc<T> {
    async fn render(&self, scope: &Scope, out: &mut dyn ResponseWriter) -> Result<(), BoxError> {
        (**self).render(scope, out).await
    }
}

/// Markup that is already rendered. Written out verbatim.
#[derive(Debug, Clone)]
pub struct Html(Bytes);

impl Html {
    pub fn new(markup: impl Into<Bytes>) -> Self {
        Self(markup.into())
    }
}

#[async_trait]
impl Component for Html {
    async fn render(&self, _scope: &Scope, out: &mut dyn ResponseWriter) -> Result<(), BoxError> {
        out.write(&self.0)?;
        Ok(())
    }
}

/// Boxed pre-rendered markup.
pub fn html(markup: impl Into<Bytes>) -> BoxComponent {
    Box::new(Html::new(markup))
}

/// Children rendered one after another. Stops at the first failure or when the scope is
/// cancelled.
#[derive(Default)]
pub struct Fragment {
    children: Vec<BoxComponent>,
}

impl Fragment {
    pub fn new(children: Vec<BoxComponent>) -> Self {
        Self { children }
    }

    pub fn push(mut self, child: impl Component + 'static) -> Self {
        self.children.push(Box::new(child));
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Component for Fragment {
    async fn render(&self, scope: &Scope, out: &mut dyn ResponseWriter) -> Result<(), BoxError> {
        for child in &self.children {
            if scope.is_cancelled() {
                return Err("render cancelled".into());
            }
            child.render(scope, out).await?;
        }
        Ok(())
    }
}

type RenderFn = dyn for<'a> Fn(
        &'a Scope,
        &'a mut dyn ResponseWriter,
    ) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>>
    + Send
    + Sync;

/// Component backed by a closure.
pub struct FnComponent {
    render: Box<RenderFn>,
}

#[async_trait]
impl Component for FnComponent {
    async fn render(&self, scope: &Scope, out: &mut dyn ResponseWriter) -> Result<(), BoxError> {
        (self.render)(scope, out).await
    }
}

/// Build a component from a closure.
///
/// ```rust,ignore
/// let greeting = from_fn(|_scope, out| Box::pin(async move {
///     out.write(b"<h1>hello</h1>")?;
///     Ok(())
/// }));
/// ```
pub fn from_fn<F>(f: F) -> BoxComponent
where
    F: for<'a> Fn(
            &'a Scope,
            &'a mut dyn ResponseWriter,
        ) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>>
        + Send
        + Sync
        + 'static,
{
    Box::new(FnComponent {
        render: Box::new(f),
    })
}

/// Adapter rendering any askama template.
#[cfg(feature = "askama")]
pub struct Template<T>(pub T);

#[cfg(feature = "askama")]
#[async_trait]
impl<T> Component for Template<T>
where
    T: askama::Template + Send + Sync,
{
    async fn render(&self, _scope: &Scope, out: &mut dyn ResponseWriter) -> Result<(), BoxError> {
        let markup = self.0.render()?;
        out.write(markup.as_bytes())?;
        Ok(())
    }
}

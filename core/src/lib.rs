//! # tpot-core
//!
//! Handler shapes for server-rendered HTML and the dispatch that drives them. The
//! transport is not part of this crate; `tpot-http` adapts it to hyper.

pub mod component;
pub mod context;
pub mod cookie;
pub mod error;
pub mod handler;
#[cfg(feature = "htmx")]
pub mod htmx;
pub mod middleware;
pub mod testing;
pub mod values;
pub mod websocket;
pub mod writer;

pub use component::{BoxComponent, Component, Fragment, Html};
pub use context::{Context, PathParams, RemoteAddr, Scope};
pub use cookie::{Cookie, SameSite};
pub use error::{BoxError, ContextError, DispatchError, DispatchResult, UpgradeError, WriteError};
pub use handler::{
    BoxFuture, Endpoint, Handler, HandlerKind, HandlerResult, Layout, Page, PageView, Partial,
    redirect,
};
pub use middleware::{Middleware, Next, Traced, chain};
pub use values::Values;
pub use websocket::{SocketHandler, SocketUpgrade, Upgrader, WebSocket};
pub use writer::{BufferedWriter, ResponseWriter};

pub mod prelude {
    pub use crate::component::{BoxComponent, Component, Fragment, Html, html};
    pub use crate::context::{Context, Scope};
    pub use crate::cookie::Cookie;
    pub use crate::error::{BoxError, DispatchError, DispatchResult};
    pub use crate::handler::{
        BoxFuture, Endpoint, Handler, HandlerResult, Layout, Page, PageView, Partial, redirect,
    };
    #[cfg(feature = "htmx")]
    pub use crate::htmx::HtmxContext;
    pub use crate::middleware::{Middleware, Next, Traced, chain, from_fn, next_fn};
    pub use crate::websocket::{SocketUpgrade, Upgrader, WebSocket};
    pub use crate::writer::ResponseWriter;

    pub use http::StatusCode;
}

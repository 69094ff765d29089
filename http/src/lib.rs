//! # tpot-http
//!
//! Hyper 1.0 transport for `tpot-core` handlers: a `tower::Service` per handler chain,
//! the default [`HttpContext`], websocket upgrades and a small accept loop.
//!
//! ```rust,ignore
//! use tpot_http::prelude::*;
//!
//! let page = Page::new(|_ctx: &mut HttpContext| {
//!     Box::pin(async { Ok(PageView::body(html("<h1>hello</h1>"))) })
//! });
//! let service = page.into_service(HttpContext::new);
//! tpot_http::run(&ServerConfig::default(), service, CancellationToken::new()).await?;
//! ```

pub mod config;
pub mod context;
pub mod passthrough;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod websocket;
pub mod writer;

pub use config::{ConfigError, ServerConfig, WebSocketSettings};
pub use context::{ContextBuilder, Exchange, HttpContext, UpgradeSource};
pub use passthrough::passthrough;
pub use server::{ServerError, run, serve};
pub use service::{IntoService, TpotService, chain_handler};
pub use websocket::{WsConnection, WsUpgrader};
pub use writer::{HttpResponse, HttpWriter};

pub mod prelude {
    pub use crate::config::ServerConfig;
    pub use crate::context::{Exchange, HttpContext};
    pub use crate::passthrough::passthrough;
    pub use crate::service::{IntoService, TpotService, chain_handler};
    pub use crate::websocket::{WsConnection, WsUpgrader};
    pub use tokio_util::sync::CancellationToken;
    pub use tpot_core::prelude::*;
}

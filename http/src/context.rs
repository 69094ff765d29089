use crate::writer::HttpWriter;
use bytes::Bytes;
use http::Request;
use hyper::upgrade::OnUpgrade;
use std::net::SocketAddr;
use tpot_core::{Context, RemoteAddr, ResponseWriter, Scope};

/// Everything the service hands over for one request.
///
/// Applications build their own context from it; [`HttpContext`] is the plain one.
pub struct Exchange {
    /// The request with its body collected. The peer address, when known, is in the
    /// extensions as [`RemoteAddr`].
    pub request: Request<Bytes>,
    pub writer: HttpWriter,
    pub scope: Scope,
    pub upgrade: Option<OnUpgrade>,
}

impl Exchange {
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.request
            .extensions()
            .get::<RemoteAddr>()
            .map(|addr| addr.0)
    }
}

/// Builds an application context from an [`Exchange`].
pub trait ContextBuilder<C>: Fn(Exchange) -> C + Send + Sync + 'static {}

impl<C, F> ContextBuilder<C> for F where F: Fn(Exchange) -> C + Send + Sync + 'static {}

/// Contexts that can give up the pending connection upgrade.
pub trait UpgradeSource {
    /// Take the upgrade future. Only the first call gets it.
    fn take_upgrade(&mut self) -> Option<OnUpgrade>;
}

pub struct HttpContext {
    request: Request<Bytes>,
    writer: HttpWriter,
    scope: Scope,
    upgrade: Option<OnUpgrade>,
}

impl HttpContext {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            request: exchange.request,
            writer: exchange.writer,
            scope: exchange.scope,
            upgrade: exchange.upgrade,
        }
    }
}

impl From<Exchange> for HttpContext {
    fn from(exchange: Exchange) -> Self {
        Self::new(exchange)
    }
}

impl Context for HttpContext {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn writer(&mut self) -> &mut dyn ResponseWriter {
        &mut self.writer
    }

    fn request(&self) -> &Request<Bytes> {
        &self.request
    }
}

impl UpgradeSource for HttpContext {
    fn take_upgrade(&mut self) -> Option<OnUpgrade> {
        self.upgrade.take()
    }
}

//! The `tower::Service` that runs a handler chain for every request.

use crate::config::ServerConfig;
use crate::context::{ContextBuilder, Exchange};
use crate::writer::{HttpResponse, HttpWriter};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio_util::sync::CancellationToken;
use tower::Service;
use tpot_core::{
    BoxError, BoxFuture, Context, DispatchResult, Handler, HandlerKind, Middleware, Next, chain,
};
use tracing::Instrument;

/// Serves one handler, wrapped in middleware, over `http` requests.
///
/// Each request gets a fresh context from the builder and a scope that is a child of
/// the service's shutdown token. Dispatch runs on its own task so that an upgraded
/// connection can outlive the response.
pub struct TpotService<C> {
    builder: Arc<dyn Fn(Exchange) -> C + Send + Sync>,
    chain: Next<C>,
    kind: HandlerKind,
    body_limit: usize,
    shutdown: CancellationToken,
}

impl<C> Clone for TpotService<C> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
            chain: self.chain.clone(),
            kind: self.kind,
            body_limit: self.body_limit,
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Compose `handler` with `middleware` (first registered runs outermost) into a service.
pub fn chain_handler<C, B>(
    builder: B,
    handler: impl Into<Handler<C>>,
    middleware: &[Arc<dyn Middleware<C>>],
) -> TpotService<C>
where
    C: Context,
    B: ContextBuilder<C>,
{
    let handler = handler.into();
    let kind = handler.kind();
    TpotService {
        builder: Arc::new(builder),
        chain: chain(handler.into_next(), middleware),
        kind,
        body_limit: crate::config::DEFAULT_MAX_BODY_BYTES,
        shutdown: CancellationToken::new(),
    }
}

/// Serve any handler directly, without middleware.
pub trait IntoService<C: Context>: Into<Handler<C>> + Sized {
    fn into_service<B: ContextBuilder<C>>(self, builder: B) -> TpotService<C> {
        chain_handler(builder, self, &[])
    }
}

impl<C: Context, T: Into<Handler<C>>> IntoService<C> for T {}

impl<C: Context> TpotService<C> {
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Request scopes are cancelled when this token is.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn with_config(self, config: &ServerConfig) -> Self {
        self.body_limit(config.max_body_bytes)
    }

    async fn respond<B>(self, mut req: Request<B>) -> HttpResponse
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError>,
    {
        let upgrade = hyper::upgrade::on(&mut req);
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::warn!(limit = self.body_limit, "request body over limit");
                return plain(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read request body");
                return plain(StatusCode::BAD_REQUEST);
            }
        };

        let scope = self.shutdown.child_token();
        let (writer, receiver) = HttpWriter::channel();
        let mut ctx = (self.builder)(Exchange {
            request: Request::from_parts(parts, body),
            writer,
            scope: scope.clone(),
            upgrade: Some(upgrade),
        });

        // Cancels the request scope if the client goes away before the response.
        let guard = scope.drop_guard();
        let chain = self.chain.clone();
        tokio::spawn(
            async move {
                let result = chain(&mut ctx).await;
                finish(&mut ctx, result);
            }
            .in_current_span(),
        );

        let response = match receiver.await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!("dispatch ended without a response");
                plain(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        guard.disarm();
        response
    }
}

fn finish<C: Context>(ctx: &mut C, result: DispatchResult) {
    if let Err(err) = result {
        if ctx.writer().is_committed() {
            tracing::error!(
                error = %err,
                stage = err.stage(),
                "dispatch failed after the response was sent"
            );
        } else {
            ctx.report_error(&err);
        }
    }
    if let Err(err) = ctx.writer().flush() {
        tracing::debug!(error = %err, "response dropped");
    }
}

fn plain(status: StatusCode) -> HttpResponse {
    let reason = status.canonical_reason().unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from_static(reason.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

impl<C, B> Service<Request<B>> for TpotService<C>
where
    C: Context,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = HttpResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            let span = tracing::info_span!(
                "HTTPRequest",
                tpot.http.method = %req.method(),
                tpot.http.path = %req.uri().path(),
                tpot.http.request_id = %request_id,
                tpot.handler = this.kind.as_str(),
            );
            Ok(this.respond(req).instrument(span).await)
        })
    }
}

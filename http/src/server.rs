use crate::config::ServerConfig;
use crate::writer::HttpResponse;
use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tpot_core::RemoteAddr;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bind the configured address and [`serve`] until `shutdown` is cancelled.
pub async fn run<S>(
    config: &ServerConfig,
    service: S,
    shutdown: CancellationToken,
) -> Result<(), ServerError>
where
    S: Service<Request<Incoming>, Response = HttpResponse, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind,
            source,
        })?;
    serve(listener, service, shutdown).await
}

/// Accept HTTP/1 connections with upgrades enabled.
///
/// Open connections are asked to finish gracefully once `shutdown` fires.
pub async fn serve<S>(
    listener: TcpListener,
    service: S,
    shutdown: CancellationToken,
) -> Result<(), ServerError>
where
    S: Service<Request<Incoming>, Response = HttpResponse, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("tpot listening on http://{}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("shutting down listener on {}", addr);
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let service = service.clone();
        let shutdown = shutdown.clone();

        tokio::task::spawn(async move {
            let hyper_service = service_fn(move |mut req: Request<Incoming>| {
                req.extensions_mut().insert(RemoteAddr(peer));
                service.clone().oneshot(req)
            });
            let conn = http1::Builder::new()
                .serve_connection(io, hyper_service)
                .with_upgrades();
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(err) = result {
                tracing::debug!("Error serving connection from {}: {:?}", peer, err);
            }
        });
    }
}

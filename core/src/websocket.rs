//! WebSocket handlers: the handler picks an upgrader and a callback, dispatch performs
//! the upgrade and hands the established connection to the callback.

use crate::context::Context;
use crate::error::{DispatchError, DispatchResult, UpgradeError};
use crate::handler::{BoxFuture, ErasedWebSocket, Handler, HandlerResult};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Turns a request into an established socket.
///
/// The transport owns the handshake; implementations write the switching response
/// through the context's sink and return the connection once it is live.
#[async_trait]
pub trait Upgrader<C: Context>: Send + Sync + 'static {
    type Socket: Send + 'static;

    async fn upgrade(&self, ctx: &mut C) -> Result<Self::Socket, UpgradeError>;
}

/// Runs for the whole lifetime of an upgraded connection.
pub type SocketHandler<S> = Box<dyn FnOnce(S) -> BoxFuture<'static, HandlerResult<()>> + Send>;

/// What a websocket handler decided. Either half missing means "do not upgrade".
pub struct SocketUpgrade<C, U>
where
    C: Context,
    U: Upgrader<C>,
{
    pub upgrader: Option<Arc<U>>,
    pub on_connect: Option<SocketHandler<U::Socket>>,
}

impl<C, U> SocketUpgrade<C, U>
where
    C: Context,
    U: Upgrader<C>,
{
    pub fn new<F, Fut>(upgrader: Arc<U>, on_connect: F) -> Self
    where
        F: FnOnce(U::Socket) -> Fut + Send + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let on_connect: SocketHandler<U::Socket> =
            Box::new(move |socket: U::Socket| -> BoxFuture<'static, HandlerResult<()>> {
                Box::pin(on_connect(socket))
            });
        Self {
            upgrader: Some(upgrader),
            on_connect: Some(on_connect),
        }
    }

    /// Leave the request alone.
    pub fn skip() -> Self {
        Self {
            upgrader: None,
            on_connect: None,
        }
    }
}

type WebSocketFn<C, U> =
    dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<SocketUpgrade<C, U>>> + Send + Sync;

/// Handler upgrading the request to a socket.
pub struct WebSocket<C, U>
where
    C: Context,
    U: Upgrader<C>,
{
    handler: Arc<WebSocketFn<C, U>>,
}

impl<C, U> Clone for WebSocket<C, U>
where
    C: Context,
    U: Upgrader<C>,
{
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<C, U> WebSocket<C, U>
where
    C: Context,
    U: Upgrader<C>,
{
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, HandlerResult<SocketUpgrade<C, U>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Arc::new(f),
        }
    }

    pub async fn serve(&self, ctx: &mut C) -> DispatchResult {
        let SocketUpgrade {
            upgrader,
            on_connect,
        } = (self.handler)(ctx)
            .await
            .map_err(DispatchError::WebSocketHandler)?;

        let (Some(upgrader), Some(on_connect)) = (upgrader, on_connect) else {
            tracing::debug!("websocket handler declined the upgrade");
            return Ok(());
        };

        let socket = upgrader
            .upgrade(ctx)
            .await
            .map_err(DispatchError::Upgrade)?;
        on_connect(socket).await.map_err(DispatchError::Socket)
    }
}

impl<C, U> From<WebSocket<C, U>> for Handler<C>
where
    C: Context,
    U: Upgrader<C>,
{
    fn from(ws: WebSocket<C, U>) -> Self {
        Handler::WebSocket(ErasedWebSocket::new(move |ctx: &mut C| {
            let ws = ws.clone();
            Box::pin(async move { ws.serve(ctx).await })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerKind;
    use crate::testing::MemoryContext;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingUpgrader {
        upgrades: AtomicUsize,
        refuse: bool,
    }

    #[derive(Debug)]
    struct FakeSocket(&'static str);

    #[async_trait]
    impl Upgrader<MemoryContext> for CountingUpgrader {
        type Socket = FakeSocket;

        async fn upgrade(&self, ctx: &mut MemoryContext) -> Result<FakeSocket, UpgradeError> {
            self.upgrades.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(UpgradeError::Handshake("missing Sec-WebSocket-Key".into()));
            }
            ctx.set_status(StatusCode::SWITCHING_PROTOCOLS);
            Ok(FakeSocket("live"))
        }
    }

    #[tokio::test]
    async fn test_half_plans_do_not_upgrade() {
        let upgrader = Arc::new(CountingUpgrader::default());

        let only_upgrader = {
            let upgrader = upgrader.clone();
            WebSocket::new(move |_ctx: &mut MemoryContext| {
                let upgrader = upgrader.clone();
                Box::pin(async move {
                    Ok(SocketUpgrade {
                        upgrader: Some(upgrader),
                        on_connect: None,
                    })
                })
            })
        };
        let mut ctx = MemoryContext::get("/ws");
        only_upgrader.serve(&mut ctx).await.unwrap();

        let only_callback = WebSocket::<MemoryContext, CountingUpgrader>::new(|_ctx| {
            Box::pin(async {
                let on_connect: SocketHandler<FakeSocket> =
                    Box::new(|_socket: FakeSocket| -> BoxFuture<'static, HandlerResult<()>> {
                        Box::pin(async { Ok(()) })
                    });
                Ok(SocketUpgrade {
                    upgrader: None,
                    on_connect: Some(on_connect),
                })
            })
        });
        let mut ctx = MemoryContext::get("/ws");
        only_callback.serve(&mut ctx).await.unwrap();

        assert_eq!(upgrader.upgrades.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.status(), StatusCode::OK);
        assert!(ctx.body().is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_hands_socket_to_callback() {
        let upgrader = Arc::new(CountingUpgrader::default());
        let seen = Arc::new(AtomicUsize::new(0));

        let ws = {
            let upgrader = upgrader.clone();
            let seen = seen.clone();
            WebSocket::new(move |_ctx: &mut MemoryContext| {
                let upgrader = upgrader.clone();
                let seen = seen.clone();
                Box::pin(async move {
                    Ok(SocketUpgrade::new(upgrader, move |socket: FakeSocket| async move {
                        assert_eq!(socket.0, "live");
                        seen.fetch_add(1, Ordering::SeqCst);
                        HandlerResult::Ok(())
                    }))
                })
            })
        };

        let handler: Handler<MemoryContext> = ws.into();
        assert_eq!(handler.kind(), HandlerKind::WebSocket);

        let mut ctx = MemoryContext::get("/ws");
        handler.serve(&mut ctx).await.unwrap();
        assert_eq!(upgrader.upgrades.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.status(), StatusCode::SWITCHING_PROTOCOLS);
    }

    #[tokio::test]
    async fn test_callback_error_is_propagated() {
        let ws = WebSocket::new(|_ctx: &mut MemoryContext| {
            Box::pin(async {
                let upgrader = Arc::new(CountingUpgrader::default());
                Ok(SocketUpgrade::new(upgrader, |_socket: FakeSocket| async {
                    HandlerResult::<()>::Err("peer sent garbage".into())
                }))
            })
        });
        let err = ws.serve(&mut MemoryContext::get("/ws")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Socket(_)));
        assert!(err.to_string().contains("peer sent garbage"));
    }

    #[tokio::test]
    async fn test_refused_upgrade() {
        let ws = WebSocket::new(|_ctx: &mut MemoryContext| {
            Box::pin(async {
                let upgrader = Arc::new(CountingUpgrader {
                    refuse: true,
                    ..Default::default()
                });
                Ok(SocketUpgrade::new(upgrader, |_socket: FakeSocket| async {
                    HandlerResult::Ok(())
                }))
            })
        });
        let err = ws.serve(&mut MemoryContext::get("/ws")).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to upgrade a websocket"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_handler_error() {
        let ws = WebSocket::<MemoryContext, CountingUpgrader>::new(|_ctx| {
            Box::pin(async { Err("not logged in".into()) })
        });
        let err = ws.serve(&mut MemoryContext::get("/ws")).await.unwrap_err();
        assert!(matches!(err, DispatchError::WebSocketHandler(_)));
    }
}

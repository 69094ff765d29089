//! `TpotService` driven through `tower::ServiceExt::oneshot`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower::ServiceExt;
use tower::service_fn;
use tpot_core::{Middleware, RemoteAddr};
use tpot_http::HttpResponse;
use tpot_http::prelude::*;

async fn send<S>(
    service: S,
    request: Request<Full<Bytes>>,
) -> (StatusCode, http::HeaderMap, String)
where
    S: tower::Service<Request<Full<Bytes>>, Response = HttpResponse, Error = Infallible>,
{
    let response = service.oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (
        parts.status,
        parts.headers,
        String::from_utf8(body.to_vec()).unwrap(),
    )
}

fn get(uri: &str) -> Request<Full<Bytes>> {
    Request::get(uri).body(Full::new(Bytes::new())).unwrap()
}

#[tokio::test]
async fn test_page_with_layout() {
    let layout = Layout::new(|_ctx: &mut HttpContext, children| {
        Box::pin(async move {
            let mut parts = vec![html("<main>")];
            parts.extend(children);
            parts.push(html("</main>"));
            Ok(Some(Box::new(Fragment::new(parts)) as BoxComponent))
        })
    });
    let page = Page::new(move |ctx: &mut HttpContext| {
        let name = ctx.query_value("name").unwrap_or_else(|| "world".into());
        let layout = layout.clone();
        Box::pin(async move {
            Ok(PageView::with_layout(
                layout,
                Some(html(format!("<h1>hello {name}</h1>"))),
            ))
        })
    });

    let service = page.into_service(HttpContext::new);
    let (status, _, body) = send(service, get("/greet?name=tea")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<main><h1>hello tea</h1></main>");
}

#[tokio::test]
async fn test_handler_error_becomes_500() {
    let partial = Partial::new(|ctx: &mut HttpContext| {
        Box::pin(async move {
            ctx.write_str("half written")?;
            HandlerResult::<Option<BoxComponent>>::Err("row vanished".into())
        })
    });

    let service = partial.into_service(HttpContext::new);
    let (status, headers, body) = send(service, get("/rows/1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
    assert_eq!(body, "Internal Server Error");
}

#[tokio::test]
async fn test_redirect() {
    let service = redirect::<HttpContext>("/login", StatusCode::SEE_OTHER)
        .into_service(HttpContext::new);
    let (status, headers, body) = send(service, get("/settings")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers["location"], "/login");
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_form_post_reaches_endpoint() {
    let endpoint = Endpoint::new(|ctx: &mut HttpContext| {
        Box::pin(async move {
            let title = ctx.form_value("title")?.unwrap_or_default();
            ctx.set_status(StatusCode::CREATED);
            ctx.write_str(&format!("saved {title}"))?;
            HandlerResult::Ok(())
        })
    });
    let request = Request::post("/notes")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from_static(b"title=first+note")))
        .unwrap();

    let (status, _, body) = send(endpoint.into_service(HttpContext::new), request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, "saved first note");
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let endpoint = Endpoint::new(|_ctx: &mut HttpContext| Box::pin(async { Ok(()) }));
    let service = endpoint.into_service(HttpContext::new).body_limit(8);
    let request = Request::post("/upload")
        .body(Full::new(Bytes::from_static(b"far more than eight bytes")))
        .unwrap();

    let (status, _, _) = send(service, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_middleware_order_through_service() {
    fn tag(name: &'static str) -> Arc<dyn Middleware<HttpContext>> {
        Arc::new(from_fn(move |ctx: &mut HttpContext, next: Next<HttpContext>| {
            Box::pin(async move {
                ctx.write_str(&format!("<{name}>")).ok();
                let result = next(ctx).await;
                ctx.write_str(&format!("</{name}>")).ok();
                result
            })
        }))
    }
    let endpoint = Endpoint::new(|ctx: &mut HttpContext| {
        Box::pin(async move {
            ctx.write_str("core")?;
            HandlerResult::Ok(())
        })
    });

    let service = chain_handler(HttpContext::new, endpoint, &[tag("a"), tag("b")]);
    let (_, _, body) = send(service, get("/")).await;
    assert_eq!(body, "<a><b>core</b></a>");
}

#[tokio::test]
async fn test_passthrough_copies_response() {
    let legacy = service_fn(|req: Request<Full<Bytes>>| async move {
        let body = format!("legacy saw {}", req.uri().path());
        let response = Response::builder()
            .status(StatusCode::ACCEPTED)
            .header("x-legacy", "1")
            .body(Full::new(Bytes::from(body)))
            .unwrap();
        Ok::<_, Infallible>(response)
    });

    let service = passthrough::<HttpContext, _, _>(legacy).into_service(HttpContext::new);
    let (status, headers, body) = send(service, get("/old/path")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(headers["x-legacy"], "1");
    assert_eq!(body, "legacy saw /old/path");
}

#[tokio::test]
async fn test_passthrough_error_is_500_not_failure() {
    let legacy = service_fn(|_req: Request<Full<Bytes>>| async {
        Err::<Response<Full<Bytes>>, _>(std::io::Error::other("backend down"))
    });

    let service = passthrough::<HttpContext, _, _>(legacy).into_service(HttpContext::new);
    let (status, _, body) = send(service, get("/old")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_websocket_without_handshake_is_400() {
    let upgrader = Arc::new(WsUpgrader::default());
    let ws = WebSocket::new(move |_ctx: &mut HttpContext| {
        let upgrader = upgrader.clone();
        Box::pin(async move {
            Ok(SocketUpgrade::new(upgrader, |_socket: WsConnection| async {
                HandlerResult::Ok(())
            }))
        })
    });

    let (status, _, body) = send(ws.into_service(HttpContext::new), get("/live")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Bad Request");
}

#[tokio::test]
async fn test_panicking_handler_still_answers() {
    let endpoint = Endpoint::new(|_ctx: &mut HttpContext| {
        Box::pin(async {
            if true {
                panic!("handler bug");
            }
            Ok(())
        })
    });
    let service = endpoint.into_service(HttpContext::new);
    let (status, _, _) = send(service, get("/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_rendered_page_is_html() {
    let page = Page::new(|_ctx: &mut HttpContext| {
        Box::pin(async { Ok(PageView::body(html("<h1>hi</h1>"))) })
    });
    let (status, headers, body) = send(page.into_service(HttpContext::new), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/html; charset=utf-8");
    assert_eq!(body, "<h1>hi</h1>");
}

#[tokio::test]
async fn test_passthrough_keeps_request_extensions() {
    let legacy = service_fn(|req: Request<Full<Bytes>>| async move {
        let remote = req
            .extensions()
            .get::<RemoteAddr>()
            .map(|addr| addr.0.to_string())
            .unwrap_or_else(|| "unknown".into());
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(remote))))
    });

    let service = passthrough::<HttpContext, _, _>(legacy).into_service(HttpContext::new);
    let mut request = get("/old");
    request
        .extensions_mut()
        .insert(RemoteAddr("1.2.3.4:5".parse().unwrap()));
    let (_, _, body) = send(service, request).await;
    assert_eq!(body, "1.2.3.4:5");
}

#[tokio::test]
async fn test_scope_cancelled_when_client_goes_away() {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let endpoint = Endpoint::new(move |ctx: &mut HttpContext| {
        let events = events_tx.clone();
        let scope = ctx.scope().clone();
        Box::pin(async move {
            events.send("started").ok();
            scope.cancelled().await;
            events.send("cancelled").ok();
            HandlerResult::Ok(())
        })
    });

    let service = endpoint.into_service(HttpContext::new);
    let call = tokio::spawn(service.oneshot(get("/slow")));
    assert_eq!(events.recv().await, Some("started"));

    call.abort();
    let next = timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    assert_eq!(next, Some("cancelled"));
}

#[tokio::test]
async fn test_scope_survives_a_sent_response() {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let endpoint = Endpoint::new(move |ctx: &mut HttpContext| {
        let events = events_tx.clone();
        Box::pin(async move {
            ctx.write_str("done")?;
            ctx.writer().flush()?;
            tokio::task::yield_now().await;
            events.send(ctx.scope().is_cancelled()).ok();
            HandlerResult::Ok(())
        })
    });

    let (_, _, body) = send(endpoint.into_service(HttpContext::new), get("/")).await;
    assert_eq!(body, "done");
    assert_eq!(events.recv().await, Some(false));
}

#[tokio::test]
async fn test_error_after_flush_keeps_sent_response() {
    let endpoint = Endpoint::new(|ctx: &mut HttpContext| {
        Box::pin(async move {
            ctx.set_status(StatusCode::ACCEPTED);
            ctx.write_str("accepted")?;
            ctx.writer().flush()?;
            HandlerResult::<()>::Err("late failure".into())
        })
    });

    let (status, headers, body) = send(endpoint.into_service(HttpContext::new), get("/")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(headers.get("content-type").is_none());
    assert_eq!(body, "accepted");
}

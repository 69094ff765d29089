use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tower::{Service, ServiceExt};
use tpot_core::{BoxError, Context, Endpoint};

/// Mount an existing `tower::Service` as an endpoint.
///
/// The request is replayed to the service and its response copied into the context's
/// sink. The endpoint never fails: a service error is logged and answered with `500`.
pub fn passthrough<C, S, ResBody>(service: S) -> Endpoint<C>
where
    C: Context,
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ResBody: Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError>,
{
    Endpoint::new(move |ctx: &mut C| {
        let service = service.clone();
        Box::pin(async move {
            let request = replay(ctx.request());
            let result = service
                .oneshot(request)
                .await
                .map_err(Into::<BoxError>::into);
            match result {
                Ok(response) => copy_response(ctx, response).await,
                Err(err) => {
                    tracing::error!(error = %err, "wrapped service failed");
                    ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
            Ok(())
        })
    })
}

fn replay(original: &Request<Bytes>) -> Request<Full<Bytes>> {
    let mut request = Request::new(Full::new(original.body().clone()));
    *request.method_mut() = original.method().clone();
    *request.uri_mut() = original.uri().clone();
    *request.version_mut() = original.version();
    *request.headers_mut() = original.headers().clone();
    *request.extensions_mut() = original.extensions().clone();
    request
}

async fn copy_response<C, B>(ctx: &mut C, response: Response<B>)
where
    C: Context,
    B: Body,
    B::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            let err: BoxError = err.into();
            tracing::error!(error = %err, "wrapped service body failed");
            ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    let writer = ctx.writer();
    writer.set_status(parts.status);
    let headers = writer.headers_mut();
    for (name, value) in parts.headers.iter() {
        headers.append(name, value.clone());
    }
    if let Err(err) = writer.write(&body) {
        tracing::warn!(error = %err, "dropping wrapped service body");
    }
}

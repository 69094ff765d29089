//! # Counter Demo - htmx page and partial from one handler
//!
//! A full page on first load; htmx button clicks `POST` back to the same URL and get
//! only the counter fragment.
//!
//! ```bash
//! cargo run --bin counter-demo -- [config.toml]
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::Method;
use tpot_core::Middleware;
use tpot_http::prelude::*;

fn shell() -> Layout<HttpContext> {
    Layout::new(|_ctx: &mut HttpContext, children| {
        Box::pin(async move {
            let mut parts = vec![html(
                "<!doctype html><html><head><title>tpot counter</title>\
                 <script src=\"https://unpkg.com/htmx.org@2.0.4\"></script></head><body>",
            )];
            parts.extend(children);
            parts.push(html("</body></html>"));
            Ok(Some(Box::new(Fragment::new(parts)) as BoxComponent))
        })
    })
}

fn counter(value: u64) -> BoxComponent {
    html(format!(
        "<div id=\"counter\"><p>clicked {value} times</p>\
         <button hx-post=\"/\" hx-target=\"#counter\" hx-swap=\"outerHTML\">+1</button></div>"
    ))
}

fn counter_page(clicks: Arc<AtomicU64>) -> Page<HttpContext> {
    Page::new(move |ctx: &mut HttpContext| {
        let value = if ctx.request().method() == Method::POST {
            clicks.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            clicks.load(Ordering::Relaxed)
        };
        let fragment_only = ctx.is_htmx();
        Box::pin(async move {
            if fragment_only {
                return Ok(PageView::body(counter(value)));
            }
            Ok(PageView::with_layout(shell(), Some(counter(value))))
        })
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tpot_http::telemetry::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    let shutdown = CancellationToken::new();
    let traced: Arc<dyn Middleware<HttpContext>> = Arc::new(Traced);
    let service = chain_handler(
        HttpContext::new,
        counter_page(Arc::new(AtomicU64::new(0))),
        &[traced],
    )
    .with_config(&config)
    .shutdown_token(shutdown.clone());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received");
            signal.cancel();
        }
    });

    tpot_http::run(&config, service, shutdown).await?;
    Ok(())
}

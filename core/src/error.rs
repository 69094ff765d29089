use http::StatusCode;
use thiserror::Error;

/// Error type handlers, layouts and components return.
///
/// `anyhow::Error`, `std::io::Error` and friends all convert into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type DispatchResult = Result<(), DispatchError>;

/// A failed dispatch, tagged with the stage that failed.
///
/// The message names the stage and embeds the cause; `source()` returns the cause
/// untouched so callers can downcast it.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("page handler returned an error: {0}")]
    PageHandler(#[source] BoxError),
    #[error("partial handler returned an error: {0}")]
    PartialHandler(#[source] BoxError),
    #[error("endpoint handler returned an error: {0}")]
    EndpointHandler(#[source] BoxError),
    #[error("websocket handler returned an error: {0}")]
    WebSocketHandler(#[source] BoxError),
    #[error("layout handler returned an error: {0}")]
    Layout(#[source] BoxError),
    #[error("failed to render body component: {0}")]
    RenderBody(#[source] BoxError),
    #[error("failed to render layout component: {0}")]
    RenderLayout(#[source] BoxError),
    #[error("failed to upgrade a websocket: {0}")]
    Upgrade(#[source] UpgradeError),
    #[error("websocket connection handler returned an error: {0}")]
    Socket(#[source] BoxError),
    #[error("middleware returned an error: {0}")]
    Middleware(#[source] BoxError),
}

impl DispatchError {
    /// Short stage label, used as a log field.
    pub fn stage(&self) -> &'static str {
        match self {
            DispatchError::PageHandler(_) => "page",
            DispatchError::PartialHandler(_) => "partial",
            DispatchError::EndpointHandler(_) => "endpoint",
            DispatchError::WebSocketHandler(_) => "websocket",
            DispatchError::Layout(_) => "layout",
            DispatchError::RenderBody(_) => "render_body",
            DispatchError::RenderLayout(_) => "render_layout",
            DispatchError::Upgrade(_) => "upgrade",
            DispatchError::Socket(_) => "socket",
            DispatchError::Middleware(_) => "middleware",
        }
    }

    /// Status used when this error is turned into a response.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Upgrade(err) => err.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Why an upgrade did not happen.
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// The request is not a valid websocket handshake.
    #[error("bad handshake: {0}")]
    Handshake(String),
    /// The `Origin` header is not allowed.
    #[error("origin not allowed: {0}")]
    Forbidden(String),
    /// The handshake was accepted but the transport could not hand over the connection.
    #[error(transparent)]
    Transport(#[from] BoxError),
}

impl UpgradeError {
    pub fn status(&self) -> StatusCode {
        match self {
            UpgradeError::Handshake(_) => StatusCode::BAD_REQUEST,
            UpgradeError::Forbidden(_) => StatusCode::FORBIDDEN,
            UpgradeError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failures of the output sink.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("response was already sent")]
    Committed,
    #[error("response receiver is gone")]
    Closed,
}

/// Failures of the convenience accessors on [`Context`](crate::Context).
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("cookie not found: {0}")]
    CookieNotFound(String),
    #[error("malformed cookie header")]
    MalformedCookie,
    #[error("failed to decode urlencoded values: {0}")]
    Decode(#[from] serde_urlencoded::de::Error),
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error(transparent)]
    Write(#[from] WriteError),
}

use crate::cookie::{self, Cookie};
use crate::error::{ContextError, DispatchError};
use crate::values::Values;
use crate::writer::ResponseWriter;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderName, HeaderValue, Request, StatusCode, Uri};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;

/// Cancellation scope of a single request.
pub type Scope = CancellationToken;

/// Peer address, inserted into request extensions by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Named path segments, inserted into request extensions by whatever router sits in
/// front of the handler.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    params: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let params = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { params }
    }
}

/// Per-request capabilities handed to every handler.
///
/// Implementors supply the scope, the output sink and the request; everything else is
/// provided on top of those three. A context is owned by one request flow and dropped
/// when it ends.
pub trait Context: Send + 'static {
    fn scope(&self) -> &Scope;

    fn writer(&mut self) -> &mut dyn ResponseWriter;

    /// The inbound request, body already collected.
    fn request(&self) -> &Request<Bytes>;

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.request()
            .extensions()
            .get::<RemoteAddr>()
            .map(|addr| addr.0)
    }

    /// Client address as reported by `X-Real-IP` or `X-Forwarded-For`, falling back to
    /// the peer address.
    fn real_ip(&self) -> Option<IpAddr> {
        if let Some(ip) = self
            .header("x-real-ip")
            .and_then(|v| v.trim().parse().ok())
        {
            return Some(ip);
        }
        if let Some(ip) = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok())
        {
            return Some(ip);
        }
        self.remote_addr().map(|addr| addr.ip())
    }

    fn uri(&self) -> &Uri {
        self.request().uri()
    }

    fn path_value(&self, key: &str) -> Option<&str> {
        self.request()
            .extensions()
            .get::<PathParams>()
            .and_then(|params| params.get(key))
    }

    /// Request header as UTF-8. Non-UTF-8 values read as absent.
    fn header(&self, key: &str) -> Option<&str> {
        self.request()
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
    }

    /// Replace a response header.
    fn set_header(&mut self, key: &str, value: &str) -> Result<(), ContextError> {
        let name = HeaderName::from_bytes(key.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.writer().headers_mut().insert(name, value);
        Ok(())
    }

    fn cookie(&self, name: &str) -> Result<Cookie, ContextError> {
        for header in self.request().headers().get_all(COOKIE) {
            let Ok(header) = header.to_str() else {
                continue;
            };
            if let Some(found) = cookie::find(header, name)? {
                return Ok(found);
            }
        }
        Err(ContextError::CookieNotFound(name.to_string()))
    }

    fn set_cookie(&mut self, cookie: &Cookie) -> Result<(), ContextError> {
        let value = HeaderValue::from_str(&cookie.to_string())?;
        self.writer().headers_mut().append(SET_COOKIE, value);
        Ok(())
    }

    fn query(&self) -> Result<Values, ContextError> {
        Values::parse(self.uri().query().unwrap_or_default().as_bytes())
    }

    /// First query value under `key`. A query string that fails to decode reads as empty.
    fn query_value(&self, key: &str) -> Option<String> {
        self.query()
            .ok()
            .and_then(|values| values.get(key).map(str::to_string))
    }

    /// Urlencoded body values followed by query values.
    fn form(&self) -> Result<Values, ContextError> {
        let mut values = Values::new();
        let urlencoded = self
            .header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if urlencoded {
            values.extend(Values::parse(self.request().body())?);
        }
        values.extend(self.query()?);
        Ok(values)
    }

    fn form_value(&self, key: &str) -> Result<Option<String>, ContextError> {
        Ok(self.form()?.get(key).map(str::to_string))
    }

    fn write_str(&mut self, text: &str) -> Result<(), ContextError> {
        self.writer().write(text.as_bytes())?;
        Ok(())
    }

    fn set_status(&mut self, status: StatusCode) {
        self.writer().set_status(status);
    }

    /// Point the client at `location`.
    ///
    /// A location that cannot be sent as a header is logged and answered with a 500.
    fn redirect(&mut self, location: &str, status: StatusCode) {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                let writer = self.writer();
                writer.headers_mut().insert(LOCATION, value);
                writer.set_status(status);
            }
            Err(err) => {
                tracing::warn!(
                    %location,
                    error = %err,
                    "redirect target is not a valid header value"
                );
                self.writer().set_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Turn a failed dispatch into a response.
    ///
    /// Anything written before the failure is discarded. Override to render error pages.
    fn report_error(&mut self, err: &DispatchError) {
        tracing::error!(error = %err, stage = err.stage(), "request dispatch failed");
        let status = err.status_code();
        let writer = self.writer();
        if writer.is_committed() {
            return;
        }
        writer.reset();
        writer.set_status(status);
        writer.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        let reason = status.canonical_reason().unwrap_or("Error");
        if let Err(write_err) = writer.write(reason.as_bytes()) {
            tracing::debug!(error = %write_err, "could not write error body");
        }
    }
}

//! In-memory context for exercising handlers without a transport.

use crate::context::{Context, Scope};
use crate::writer::{BufferedWriter, ResponseWriter};
use bytes::Bytes;
use http::{Method, Request, StatusCode};

/// A [`Context`] over a prepared request and a [`BufferedWriter`].
pub struct MemoryContext {
    request: Request<Bytes>,
    writer: BufferedWriter,
    scope: Scope,
}

impl MemoryContext {
    pub fn new(request: Request<Bytes>) -> Self {
        Self {
            request,
            writer: BufferedWriter::new(),
            scope: Scope::new(),
        }
    }

    /// Bodyless `GET` for `uri`.
    pub fn get(uri: &str) -> Self {
        Self::new(Self::request(Method::GET, uri, Bytes::new()))
    }

    /// `POST` of a urlencoded form.
    pub fn post_form(uri: &str, form: &str) -> Self {
        let mut request = Self::request(Method::POST, uri, Bytes::copy_from_slice(form.as_bytes()));
        request.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        Self::new(request)
    }

    fn request(method: Method, uri: &str, body: Bytes) -> Request<Bytes> {
        let mut request = Request::new(body);
        *request.method_mut() = method;
        *request.uri_mut() = uri.parse().expect("valid test uri");
        request
    }

    pub fn request_mut(&mut self) -> &mut Request<Bytes> {
        &mut self.request
    }

    pub fn status(&self) -> StatusCode {
        self.writer.status()
    }

    pub fn response_header(&self, key: &str) -> Option<&str> {
        self.writer
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        self.writer.body()
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(self.writer.body()).into_owned()
    }

    pub fn into_writer(self) -> BufferedWriter {
        self.writer
    }
}

impl Context for MemoryContext {
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

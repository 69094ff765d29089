use crate::error::WriteError;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

/// The output sink of a request.
///
/// Components render into it and endpoints write raw output through it. A transport
/// decides what `flush` means; for the in-memory [`BufferedWriter`] it only marks the
/// response as committed.
pub trait ResponseWriter: Send {
    fn status(&self) -> StatusCode;

    fn set_status(&mut self, status: StatusCode);

    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Append bytes to the response body.
    fn write(&mut self, chunk: &[u8]) -> Result<(), WriteError>;

    /// Drop everything written so far: status, headers and body.
    fn reset(&mut self);

    /// Send status, headers and buffered body downstream. Later writes fail.
    fn flush(&mut self) -> Result<(), WriteError>;

    fn is_committed(&self) -> bool;
}

/// Response sink that keeps everything in memory until it is taken apart.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    committed: bool,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the writer into its parts.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body.freeze())
    }

    /// Move headers and body out. The status stays readable.
    pub fn take(&mut self) -> (StatusCode, HeaderMap, Bytes) {
        let status = self.status;
        let headers = std::mem::take(&mut self.headers);
        let body = self.body.split().freeze();
        (status, headers, body)
    }

    pub fn mark_committed(&mut self) {
        self.committed = true;
    }
}

impl ResponseWriter for BufferedWriter {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), WriteError> {
        if self.committed {
            return Err(WriteError::Committed);
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        self.committed = true;
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.committed
    }
}

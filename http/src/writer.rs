use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;
use tokio::sync::oneshot;
use tpot_core::{BufferedWriter, ResponseWriter, WriteError};

pub type HttpResponse = Response<Full<Bytes>>;

/// Response sink that buffers until flushed, then hands the response to the service.
///
/// Flushing early is how an upgrade gets its `101` out while dispatch keeps running.
pub struct HttpWriter {
    buffer: BufferedWriter,
    sender: Option<oneshot::Sender<HttpResponse>>,
}

impl HttpWriter {
    pub fn new(sender: oneshot::Sender<HttpResponse>) -> Self {
        Self {
            buffer: BufferedWriter::new(),
            sender: Some(sender),
        }
    }

    /// A writer paired with the receiver its response will arrive on.
    pub fn channel() -> (Self, oneshot::Receiver<HttpResponse>) {
        let (sender, receiver) = oneshot::channel();
        (Self::new(sender), receiver)
    }
}

impl ResponseWriter for HttpWriter {
    fn status(&self) -> StatusCode {
        self.buffer.status()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.buffer.set_status(status);
    }

    fn headers(&self) -> &HeaderMap {
        self.buffer.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.buffer.headers_mut()
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), WriteError> {
        self.buffer.write(chunk)
    }

    fn reset(&mut self) {
        if !self.is_committed() {
            self.buffer.reset();
        }
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        let Some(sender) = self.sender.take() else {
            return Ok(());
        };
        let (status, headers, body) = self.buffer.take();
        self.buffer.mark_committed();

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        sender.send(response).map_err(|_| WriteError::Closed)
    }

    fn is_committed(&self) -> bool {
        self.sender.is_none()
    }
}

//! WebSocket upgrades over hyper, handing out `tokio-tungstenite` streams.

use crate::config::WebSocketSettings;
use crate::context::UpgradeSource;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{
    CONNECTION, HOST, ORIGIN, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use http::uri::Authority;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tpot_core::{Context, UpgradeError, Upgrader};

/// An established server-side websocket.
pub type WsConnection = WebSocketStream<TokioIo<Upgraded>>;

/// Upgrades `GET` requests carrying a websocket handshake.
///
/// Cross-origin requests are refused unless their origin is listed in
/// [`WebSocketSettings::allowed_origins`].
#[derive(Debug, Clone, Default)]
pub struct WsUpgrader {
    settings: WebSocketSettings,
}

struct Handshake {
    accept: String,
    protocol: Option<String>,
}

impl WsUpgrader {
    pub fn new(settings: WebSocketSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &WebSocketSettings {
        &self.settings
    }

    fn handshake(&self, req: &Request<Bytes>) -> Result<Handshake, UpgradeError> {
        let headers = req.headers();
        if req.method() != Method::GET {
            return Err(UpgradeError::Handshake(format!(
                "method {} is not GET",
                req.method()
            )));
        }
        if !has_token(headers, CONNECTION, "upgrade") {
            return Err(UpgradeError::Handshake(
                "missing `Connection: upgrade`".into(),
            ));
        }
        if !has_token(headers, UPGRADE, "websocket") {
            return Err(UpgradeError::Handshake(
                "missing `Upgrade: websocket`".into(),
            ));
        }
        if headers.get(SEC_WEBSOCKET_VERSION).map(|v| v.as_bytes()) != Some(b"13") {
            return Err(UpgradeError::Handshake(
                "unsupported websocket version".into(),
            ));
        }
        let key = headers
            .get(SEC_WEBSOCKET_KEY)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| UpgradeError::Handshake("missing Sec-WebSocket-Key".into()))?;

        self.check_origin(headers)?;

        Ok(Handshake {
            accept: derive_accept_key(key.as_bytes()),
            protocol: self.select_protocol(headers),
        })
    }

    fn check_origin(&self, headers: &HeaderMap) -> Result<(), UpgradeError> {
        let Some(origin) = headers.get(ORIGIN) else {
            return Ok(());
        };
        let origin = origin
            .to_str()
            .map_err(|_| UpgradeError::Forbidden("unreadable origin".into()))?;

        if !self.settings.allowed_origins.is_empty() {
            return if self.settings.allowed_origins.iter().any(|o| o == origin) {
                Ok(())
            } else {
                Err(UpgradeError::Forbidden(origin.to_string()))
            };
        }

        // same-origin: the origin must name the Host we were reached on, default ports
        // filled in from the origin's scheme
        let host = headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.parse::<Authority>().ok());
        let same_origin = origin.parse::<Uri>().ok().zip(host).is_some_and(|(uri, host)| {
            let default_port = match uri.scheme_str() {
                Some("https") | Some("wss") => 443,
                _ => 80,
            };
            uri.host()
                .is_some_and(|h| h.eq_ignore_ascii_case(host.host()))
                && uri.port_u16().unwrap_or(default_port)
                    == host.port_u16().unwrap_or(default_port)
        });
        if same_origin {
            Ok(())
        } else {
            Err(UpgradeError::Forbidden(origin.to_string()))
        }
    }

    fn select_protocol(&self, headers: &HeaderMap) -> Option<String> {
        let offered: Vec<&str> = headers
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .collect();
        self.settings
            .subprotocols
            .iter()
            .find(|ours| offered.contains(&ours.as_str()))
            .cloned()
    }
}

fn has_token(headers: &HeaderMap, name: http::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

#[async_trait]
impl<C> Upgrader<C> for WsUpgrader
where
    C: Context + UpgradeSource,
{
    type Socket = WsConnection;

    async fn upgrade(&self, ctx: &mut C) -> Result<WsConnection, UpgradeError> {
        let handshake = self.handshake(ctx.request())?;
        let on_upgrade = ctx
            .take_upgrade()
            .ok_or_else(|| UpgradeError::Handshake("connection cannot be upgraded".into()))?;

        let writer = ctx.writer();
        writer.reset();
        writer.set_status(StatusCode::SWITCHING_PROTOCOLS);
        let headers = writer.headers_mut();
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        let accept = HeaderValue::from_str(&handshake.accept)
            .map_err(|e| UpgradeError::Transport(Box::new(e)))?;
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
        if let Some(protocol) = handshake.protocol {
            let protocol = HeaderValue::from_str(&protocol)
                .map_err(|e| UpgradeError::Transport(Box::new(e)))?;
            headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        }
        writer
            .flush()
            .map_err(|e| UpgradeError::Transport(Box::new(e)))?;

        let upgraded = on_upgrade
            .await
            .map_err(|e| UpgradeError::Transport(Box::new(e)))?;
        tracing::debug!("websocket connection established");

        Ok(WebSocketStream::from_raw_socket(
            TokioIo::new(upgraded),
            Role::Server,
            Some(self.settings.protocol_config()),
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_request(extra: &[(&str, &str)]) -> Request<Bytes> {
        let mut builder = Request::get("/live")
            .header("host", "tpot.example")
            .header("connection", "keep-alive, Upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn test_accept_key() {
        let handshake = WsUpgrader::default()
            .handshake(&handshake_request(&[]))
            .unwrap();
        assert_eq!(handshake.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(handshake.protocol.is_none());
    }

    #[test]
    fn test_rejects_plain_request() {
        let req = Request::get("/live").body(Bytes::new()).unwrap();
        let err = WsUpgrader::default().handshake(&req).err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_same_origin_by_default() {
        let upgrader = WsUpgrader::default();
        assert!(
            upgrader
                .handshake(&handshake_request(&[("origin", "https://tpot.example")]))
                .is_ok()
        );
        let err = upgrader
            .handshake(&handshake_request(&[("origin", "https://evil.example")]))
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_same_origin_ignores_default_ports() {
        let upgrader = WsUpgrader::default();
        let with_port = |host: &str, origin: &str| {
            let mut req = handshake_request(&[("origin", origin)]);
            req.headers_mut().insert(HOST, HeaderValue::from_str(host).unwrap());
            upgrader.handshake(&req).map(|_| ())
        };
        assert!(with_port("tpot.example:443", "https://tpot.example").is_ok());
        assert!(with_port("tpot.example", "http://tpot.example:80").is_ok());
        assert!(with_port("TPOT.example:8443", "https://tpot.example:8443").is_ok());

        let err = with_port("tpot.example:8080", "https://tpot.example").unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(with_port("tpot.example:80", "https://tpot.example").is_err());
    }

    #[test]
    fn test_allow_list_and_subprotocol() {
        let upgrader = WsUpgrader::new(WebSocketSettings {
            allowed_origins: vec!["https://app.example".into()],
            subprotocols: vec!["chat.v2".into(), "chat.v1".into()],
            ..WebSocketSettings::default()
        });
        let handshake = upgrader
            .handshake(&handshake_request(&[
                ("origin", "https://app.example"),
                ("sec-websocket-protocol", "chat.v1, chat.v2"),
            ]))
            .unwrap();
        assert_eq!(handshake.protocol.as_deref(), Some("chat.v2"));

        let same_host = upgrader
            .handshake(&handshake_request(&[("origin", "https://tpot.example")]))
            .err()
            .unwrap();
        assert!(matches!(same_host, UpgradeError::Forbidden(_)));
    }
}

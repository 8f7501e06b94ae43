use std::pin::Pin;

use async_trait::async_trait;
use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{info, warn};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use url::Url;

use crate::api::events::{ClientEvent, ServerEvent};
use crate::credential::Credential;
use crate::error::TransportError;

pub type FrameSink = Pin<Box<dyn Sink<ClientEvent, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<ServerEvent, TransportError>> + Send>>;

/// One established duplex link. The stream ending or yielding an error means
/// the link is gone.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens physical links for the transport worker.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, credential: &Credential) -> Result<Link, TransportError>;
}

pub struct WebSocketDialer {
    url: Url,
}

impl WebSocketDialer {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        Ok(Self { url: Url::parse(url)? })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, credential: &Credential) -> Result<Link, TransportError> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&credential.bearer()).map_err(|_| TransportError::Credential)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _) = connect_async(request).await?;
        info!("socket connected to {}", self.url);

        let (sink, stream) = socket.split();
        let sink = sink.sink_map_err(TransportError::from).with(|event: ClientEvent| {
            future::ready(event.encode().map(WsMessage::Text).map_err(TransportError::from))
        });
        let stream = stream.filter_map(|frame| future::ready(decode_frame(frame)));

        Ok(Link { sink: Box::pin(sink), stream: Box::pin(stream) })
    }
}

fn decode_frame(frame: Result<WsMessage, WsError>) -> Option<Result<ServerEvent, TransportError>> {
    match frame {
        Ok(WsMessage::Text(text)) => match ServerEvent::decode(&text) {
            Ok(event) => event.map(Ok),
            Err(err) => {
                warn!("dropping malformed frame: {err}");
                None
            }
        },
        Ok(WsMessage::Close(_)) => Some(Err(TransportError::Closed)),
        Ok(_) => None,
        Err(err) => Some(Err(err.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_frames_decode_and_noise_is_skipped() {
        let frame = json!({ "event": "online-users", "data": ["u1", "u2"] }).to_string();
        let decoded = decode_frame(Ok(WsMessage::Text(frame)));
        assert!(matches!(decoded, Some(Ok(ServerEvent::OnlineUsers(ref ids))) if ids.len() == 2));

        assert!(decode_frame(Ok(WsMessage::Ping(vec![1]))).is_none());
        assert!(decode_frame(Ok(WsMessage::Text("not json".into()))).is_none());
        assert!(matches!(decode_frame(Ok(WsMessage::Close(None))), Some(Err(TransportError::Closed))));
    }

    #[test]
    fn rejects_invalid_socket_url() {
        assert!(WebSocketDialer::new("not a url").is_err());
    }
}

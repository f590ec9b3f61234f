//! WebSocket transport: one broker session per socket.
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use fathom_common::models::{ClientEvent, ServerEvent};
use fathom_common::telemetry::ERRORS_TARGET;
use fathom_error::{ErrorCode, ErrorContext, FathomError};
use fathom_runtime::{QueryBroker, SessionHandle};

use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state.broker))
}

async fn serve_socket(socket: WebSocket, broker: Arc<QueryBroker>) {
    let (session, mut responses) = broker.connect();
    let id = session.id();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(response) = responses.recv().await {
            let frame = match ServerEvent::QueryResponse(response).encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(target: ERRORS_TARGET, connection_id = id, error = %e, "Failed to encode response");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = dispatch_frame(&session, text.as_str()) {
                        warn!(
                            target: ERRORS_TARGET,
                            connection_id = id,
                            code = %e.code,
                            error = %e,
                            "Ignoring frame"
                        );
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(connection_id = id, "Ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id = id, error = %e, "Socket error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    writer.abort();
    session.close();
}

/// Route one client text frame to the session.
pub fn dispatch_frame(session: &SessionHandle, text: &str) -> fathom_error::Result<()> {
    let event = ClientEvent::decode(text).map_err(|e| {
        FathomError::new(ErrorCode::MalformedMessage, e.to_string())
            .with_context(ErrorContext::Frame { raw: text.to_string() })
    })?;
    match event {
        ClientEvent::Query(query) => session.submit(query),
        ClientEvent::Cancel(query) => session.cancel(query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fathom_runtime::{BrokerSettings, QueryExecutor};
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl QueryExecutor for EchoExecutor {
        async fn execute(&self, query: &str) -> fathom_error::Result<serde_json::Value> {
            Ok(json!([{ "echo": query }]))
        }
    }

    #[tokio::test]
    async fn test_query_frame_reaches_session() {
        let broker = QueryBroker::new(Arc::new(EchoExecutor), BrokerSettings::default());
        let (session, mut rx) = broker.connect();

        dispatch_frame(&session, r#"{"event":"query","data":"SELECT 1"}"#).unwrap();
        let response = rx.recv().await.unwrap();
        assert_eq!(response.query_str, "SELECT 1");
        assert_eq!(*response.result, json!([{ "echo": "SELECT 1" }]));
    }

    #[tokio::test]
    async fn test_malformed_frames_are_rejected() {
        let broker = QueryBroker::new(Arc::new(EchoExecutor), BrokerSettings::default());
        let (session, _rx) = broker.connect();

        let err = dispatch_frame(&session, "SELECT 1").unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedMessage);
        assert!(matches!(err.context, Some(ErrorContext::Frame { .. })));
        assert!(dispatch_frame(&session, r#"{"event":"subscribe","data":"x"}"#).is_err());
        assert!(dispatch_frame(&session, r#"{"event":"query","data":42}"#).is_err());

        // The session is still usable afterwards.
        assert!(dispatch_frame(&session, r#"{"event":"cancel","data":"SELECT 1"}"#).is_ok());
    }
}

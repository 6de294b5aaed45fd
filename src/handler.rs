//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake with
//! credential check, registration with the Hub, and waiting for the client's
//! pumps to finish.

use std::sync::Arc;

use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::error::{AppError, AuthError};
use crate::hub::Hub;
use crate::message::ServerMessage;
use crate::transport::ws;
use crate::types::Username;

/// Handle a new TCP connection
///
/// The handshake request must carry `?token=<token>` or `?username=<name>`;
/// the latter logs in and issues a token. The connection is refused with
/// 401 otherwise.
pub async fn handle_connection(
    stream: TcpStream,
    hub: Hub,
    authenticator: Arc<dyn Authenticator>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    let mut credentials = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match authenticate(authenticator.as_ref(), request.uri().query()) {
            Ok(granted) => {
                credentials = Some(granted);
                Ok(response)
            }
            Err(e) => {
                warn!("Refusing handshake from {}: {}", peer_addr, e);
                let mut rejection = ErrorResponse::new(Some(e.to_string()));
                *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                Err(rejection)
            }
        }
    };

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (username, token) = credentials.ok_or(AuthError::MissingCredentials)?;

    let (source, sink) = ws::split(ws_stream);
    let greeting = ServerMessage::Connected {
        username: username.clone(),
        token,
    };
    let client = hub
        .register_user_with_greeting(username.as_str(), source, sink, greeting)
        .await?;
    info!("Client {} connected from {} as {}", client.id(), peer_addr, username);

    client.closed().await;
    info!("Client {} disconnected", username);

    Ok(())
}

/// Handshake query parameters; other keys are ignored
#[derive(Debug, Default, Deserialize)]
struct Credentials {
    token: Option<String>,
    username: Option<String>,
}

/// Resolve handshake query parameters to an identity and its token
///
/// Values are percent-decoded; empty values count as absent.
pub fn authenticate(
    authenticator: &dyn Authenticator,
    query: Option<&str>,
) -> Result<(Username, String), AuthError> {
    let credentials: Credentials = serde_urlencoded::from_str(query.unwrap_or_default())
        .map_err(|_| AuthError::MissingCredentials)?;
    let present = |value: Option<String>| value.filter(|v| !v.is_empty());

    if let Some(token) = present(credentials.token) {
        let username = authenticator.verify_token(&token)?;
        return Ok((username, token));
    }
    if let Some(name) = present(credentials.username) {
        let token = authenticator.issue_token(&name)?;
        return Ok((Username::parse(name)?, token));
    }
    Err(AuthError::MissingCredentials)
}

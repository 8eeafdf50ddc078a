//! HTTP server.
//!
//! This module contains the HTTP server of rfsoc-inspector, which is a web
//! server implemented using [`axum`].

use crate::app::AppState;
use anyhow::Result;
use axum::{routing::get, Router};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

mod api;
mod frame;
mod inspector;
mod registers;
mod websocket;

/// HTTP server.
///
/// The HTTP server gives access to the acquisition and plotting settings, to
/// manual frame captures, and to the stream of periodically captured frames.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    app: Router,
}

impl Server {
    /// Creates a new HTTP server.
    ///
    /// The `address` parameter gives the address in which the server will
    /// listen. The `frame_sender` is used to obtain frame channel receivers
    /// for the websocket server.
    ///
    /// After calling this function, the server needs to be run by calling
    /// [`Server::run`].
    pub async fn new(
        address: &std::net::SocketAddr,
        state: AppState,
        frame_sender: broadcast::Sender<Bytes>,
    ) -> Result<Server> {
        let app = Router::new()
            .route("/api", get(api::get_api))
            .route(
                "/api/inspector",
                get(inspector::get_inspector).patch(inspector::patch_inspector),
            )
            .route("/api/frame", get(frame::get_frame))
            .route("/api/registers", get(registers::get_registers))
            .route("/frames", get(websocket::handler).with_state(frame_sender))
            .with_state(state)
            .layer(TraceLayer::new_for_http());
        tracing::info!(%address, "starting HTTP server");
        let listener = TcpListener::bind(address).await?;
        Ok(Server { listener, app })
    }

    /// Runs the HTTP server.
    ///
    /// This only returns if there is a fatal error.
    pub async fn run(self) -> Result<()> {
        Ok(axum::serve(self.listener, self.app).await?)
    }
}

mod json_error {
    use crate::error::Error as InspectorError;
    use anyhow::Error;
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Serialize;

    #[derive(Serialize, Debug, Clone, Eq, PartialEq)]
    pub struct JsonError {
        http_status_code: u16,
        error_description: String,
    }

    impl JsonError {
        pub fn from_error(status_code: StatusCode, error: Error) -> JsonError {
            JsonError {
                http_status_code: status_code.as_u16(),
                error_description: format!("{error:#}"),
            }
        }

        pub fn client_error(error: Error) -> JsonError {
            JsonError::from_error(StatusCode::BAD_REQUEST, error)
        }

        pub fn server_error(error: Error) -> JsonError {
            JsonError::from_error(StatusCode::INTERNAL_SERVER_ERROR, error)
        }

        pub fn status_code(&self) -> StatusCode {
            StatusCode::from_u16(self.http_status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }

    impl From<InspectorError> for JsonError {
        fn from(error: InspectorError) -> JsonError {
            if error.is_client_error() {
                JsonError::client_error(error.into())
            } else {
                JsonError::server_error(error.into())
            }
        }
    }

    impl IntoResponse for JsonError {
        fn into_response(self) -> Response {
            let json = serde_json::to_string(&self).unwrap();
            (self.status_code(), json).into_response()
        }
    }
}

//! FeedbackServer - wires configuration, sinks and the HTTP surface together

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use contracts::ServiceBlueprint;
use dispatcher::{create_fanout, FanoutReport};

use crate::endpoint::FeedbackEndpoint;
use crate::error::ServerError;
use crate::http::{build_router, AppState};

/// A configured but not yet listening service
pub struct FeedbackServer {
    endpoint: Arc<FeedbackEndpoint>,
    max_body_bytes: usize,
}

impl FeedbackServer {
    /// Open the sinks described by the blueprint
    ///
    /// Must be called inside a tokio runtime; each sink gets its worker task.
    pub fn from_blueprint(blueprint: &ServiceBlueprint) -> Result<Self, ServerError> {
        let fanout = create_fanout(blueprint.sinks.clone(), blueprint.warehouse.clone())?;
        let endpoint = FeedbackEndpoint::from_blueprint(blueprint, Arc::new(fanout))?;
        Ok(Self {
            endpoint: Arc::new(endpoint),
            max_body_bytes: blueprint.server.max_body_bytes,
        })
    }

    pub fn endpoint(&self) -> &Arc<FeedbackEndpoint> {
        &self.endpoint
    }

    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(Arc::clone(&self.endpoint)), self.max_body_bytes)
    }

    /// Serve until `shutdown` resolves, then close every sink
    #[instrument(name = "feedback_server_run", skip_all)]
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<FanoutReport, ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, sinks = ?self.endpoint.fanout().sink_names(), "Feedback endpoint listening");

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("HTTP server stopped, closing sinks");
        let report = self.endpoint.fanout().close_all().await;
        if !report.is_success() {
            for failure in report.failures() {
                warn!(sink = %failure.sink, error = %failure.cause, "Sink close failed");
            }
        }
        Ok(report)
    }
}

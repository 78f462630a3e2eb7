//! SinkHandle - owns one sink behind a worker task
//!
//! The worker is the only code that ever touches the sink, so concurrent
//! requests are serialized through its command queue. Every command carries a
//! oneshot reply, which lets the fan-out wait for the real write outcome.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{ContractError, FeedbackRecord, FeedbackSink};

use crate::metrics::SinkMetrics;

type Reply = oneshot::Sender<Result<(), ContractError>>;

enum SinkCommand {
    Write {
        record: Arc<FeedbackRecord>,
        reply: Reply,
    },
    Close {
        reply: Reply,
    },
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Command channel to the worker
    tx: mpsc::Sender<SinkCommand>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: FeedbackSink + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Whether the worker has stopped (closed or crashed)
    pub fn is_stopped(&self) -> bool {
        self.worker_handle.is_finished()
    }

    /// Write a record and wait for the sink's answer
    ///
    /// Waits for queue space instead of dropping; feedback is never discarded
    /// silently.
    pub async fn write(&self, record: Arc<FeedbackRecord>) -> Result<(), ContractError> {
        let (reply, rx) = oneshot::channel();
        self.send(SinkCommand::Write { record, reply }, rx).await
    }

    /// Flush and close the sink; the worker exits afterwards
    pub async fn close(&self) -> Result<(), ContractError> {
        let (reply, rx) = oneshot::channel();
        self.send(SinkCommand::Close { reply }, rx).await
    }

    async fn send(
        &self,
        command: SinkCommand,
        rx: oneshot::Receiver<Result<(), ContractError>>,
    ) -> Result<(), ContractError> {
        if self.tx.send(command).await.is_err() {
            self.metrics.record_failed();
            return Err(ContractError::sink_closed(&self.name));
        }
        self.metrics
            .set_queue_len(self.tx.max_capacity() - self.tx.capacity());

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                // Reply dropped: the worker died mid-command
                self.metrics.record_failed();
                error!(sink = %self.name, "Sink worker stopped without replying");
                Err(ContractError::sink_write(
                    &self.name,
                    "sink worker stopped unexpectedly",
                ))
            }
        }
    }
}

/// Worker task that executes commands against the sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: FeedbackSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SinkCommand>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(command) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match command {
            SinkCommand::Write { record, reply } => {
                let result = sink.write(&record).await;
                match &result {
                    Ok(()) => {
                        metrics.record_stored();
                        observability::record_sink_write(&name, true);
                    }
                    Err(e) => {
                        metrics.record_failed();
                        observability::record_sink_write(&name, false);
                        error!(sink = %name, error = %e, "Write failed");
                        // Keep serving; one bad write must not take the sink down
                    }
                }
                // Requester may have given up; the write already happened
                let _ = reply.send(result);
            }
            SinkCommand::Close { reply } => {
                // Refuse new commands before answering, then fail what is queued
                rx.close();
                let result = shutdown_sink(&mut sink, &name).await;
                let _ = reply.send(result);
                while let Ok(pending) = rx.try_recv() {
                    let reply = match pending {
                        SinkCommand::Write { reply, .. } | SinkCommand::Close { reply } => reply,
                    };
                    let _ = reply.send(Err(ContractError::sink_closed(&name)));
                }
                debug!(sink = %name, "Sink worker stopped");
                return;
            }
        }
    }

    // Every handle dropped without an explicit close
    if let Err(e) = shutdown_sink(&mut sink, &name).await {
        error!(sink = %name, error = %e, "Shutdown failed after handle drop");
    }
    debug!(sink = %name, "Sink worker stopped");
}

async fn shutdown_sink<S: FeedbackSink>(sink: &mut S, name: &str) -> Result<(), ContractError> {
    let flushed = sink.flush().await;
    if let Err(e) = &flushed {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    let closed = sink.close().await;
    if let Err(e) = &closed {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }
    flushed.and(closed)
}

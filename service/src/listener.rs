//! Graceful-shutdown listener loop.
//!
//! [`GracefulListener`] serves an axum router until a termination signal
//! arrives, then stops accepting connections, lets in-flight requests
//! finish, and only then returns.
//!
//! Two paths run concurrently. The calling task runs the accept/serve loop.
//! A spawned waiter blocks on the termination signal, logs the transition,
//! drains the server and reports completion over a oneshot channel. The
//! caller returns once the serve loop has exited and that completion has
//! arrived.
//!
//! A serve failure (including failing to bind) is logged and does not start
//! a shutdown. Only a signal does.

use std::{future::Future, future::IntoFuture, io, sync::Arc, time::Duration};

use axum::Router;
use tokio::{
    net::TcpListener,
    sync::{oneshot, watch},
};

use crate::logging::{fields, Logger};
use crate::signals::{ShutdownSignals, Termination};

const MSG_LISTEN: &str = "Listen and gracefully shutdown";
const MSG_SHUTDOWN_START: &str = "Start graceful shutdown. Waiting for current request to finish";
const MSG_SHUTDOWN_FAILED: &str = "HTTP server Shutdown";
const MSG_SERVE_FAILED: &str = "HTTP server ListenAndServe";
const MSG_STOPPED: &str = "Shutdown";

/// Serve `app` on `addr` until SIGINT or SIGTERM, then drain and return.
///
/// The logger is the only way to see failures: bind errors, drain errors and
/// a failed signal subscription are all reported through it. In the last
/// case the function returns immediately since no shutdown could ever be
/// requested.
pub async fn listen_gracefully(addr: &str, app: Router, log: Arc<dyn Logger>) {
    GracefulListener::new(log)
        .listen_until_signalled(addr, app)
        .await;
}

/// Errors from the drain step of a graceful shutdown.
#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("in-flight requests did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Runs a listener through start, serve, drain and stop.
#[derive(Clone)]
pub struct GracefulListener {
    log: Arc<dyn Logger>,
    drain_timeout: Option<Duration>,
}

impl GracefulListener {
    #[must_use]
    pub fn new(log: Arc<dyn Logger>) -> Self {
        Self {
            log,
            drain_timeout: None,
        }
    }

    /// Bound the drain. `None` (the default) waits for in-flight requests
    /// indefinitely. When the bound is hit the drain is reported as failed
    /// and the listener returns without waiting for the remaining requests.
    #[must_use]
    pub const fn drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Bind `addr` and serve until SIGINT or SIGTERM.
    pub async fn listen_until_signalled(&self, addr: &str, app: Router) {
        let signals = match ShutdownSignals::install() {
            Ok(signals) => signals,
            Err(err) => {
                self.log.error(
                    "Unable to subscribe to termination signals",
                    &[fields([("err", err.to_string())])],
                );
                return;
            }
        };

        self.listen(addr, app, signals.recv()).await;
    }

    /// Bind `addr` and serve until `signal` resolves.
    pub async fn listen<F>(&self, addr: &str, app: Router, signal: F)
    where
        F: Future<Output = Termination> + Send + 'static,
    {
        self.log.info(MSG_LISTEN, &[fields([("addr", addr)])]);
        let bound = TcpListener::bind(addr).await;
        self.run(bound, app, signal).await;
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, app: Router, signal: F)
    where
        F: Future<Output = Termination> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        self.log.info(MSG_LISTEN, &[fields([("addr", addr)])]);
        self.run(Ok(listener), app, signal).await;
    }

    async fn run<F>(&self, bound: io::Result<TcpListener>, app: Router, signal: F)
    where
        F: Future<Output = Termination> + Send + 'static,
    {
        let (trigger_tx, trigger_rx) = oneshot::channel::<()>();
        let (abandon_tx, abandon_rx) = oneshot::channel::<()>();
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let (drained_tx, drained_rx) = oneshot::channel::<()>();

        let drain = Drain {
            trigger: trigger_tx,
            abandon: abandon_tx,
            stopped: stopped_rx,
            timeout: self.drain_timeout,
        };
        let log = Arc::clone(&self.log);
        tokio::spawn(async move {
            let termination = signal.await;
            log.info(
                MSG_SHUTDOWN_START,
                &[fields([("signal", termination.as_str())])],
            );
            if let Err(err) = drain.run().await {
                log.error(MSG_SHUTDOWN_FAILED, &[fields([("err", err.to_string())])]);
            }
            drained_tx.send(()).ok();
        });

        match bound {
            Ok(listener) => {
                let shutdown = async move {
                    trigger_rx.await.ok();
                };
                let server = axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .into_future();

                tokio::select! {
                    result = server => {
                        if let Err(err) = result {
                            self.log.error(MSG_SERVE_FAILED, &[fields([("err", err.to_string())])]);
                        }
                    }
                    Ok(()) = abandon_rx => {
                        tracing::debug!("drain abandoned, no longer waiting for open connections");
                    }
                }
            }
            Err(err) => {
                self.log
                    .error(MSG_SERVE_FAILED, &[fields([("err", err.to_string())])]);
            }
        }

        stopped_tx.send_replace(true);
        drained_rx.await.ok();
        self.log.info(MSG_STOPPED, &[]);
    }
}

/// The waiter's handle on the serve loop.
struct Drain {
    trigger: oneshot::Sender<()>,
    abandon: oneshot::Sender<()>,
    stopped: watch::Receiver<bool>,
    timeout: Option<Duration>,
}

impl Drain {
    /// Stop accepting and wait for the serve loop to finish its connections.
    async fn run(self) -> Result<(), DrainError> {
        let Self {
            trigger,
            abandon,
            mut stopped,
            timeout,
        } = self;

        // Err means the serve loop is already gone, which is not a failure.
        trigger.send(()).ok();

        let finished = async move {
            stopped.wait_for(|done| *done).await.ok();
        };

        match timeout {
            None => {
                finished.await;
                Ok(())
            }
            Some(limit) => {
                if tokio::time::timeout(limit, finished).await.is_ok() {
                    Ok(())
                } else {
                    abandon.send(()).ok();
                    Err(DrainError::TimedOut(limit))
                }
            }
        }
    }
}

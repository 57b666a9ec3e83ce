//! Run a graceful listener in the background for socket-level tests.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use httpkit::{logging::Logger, GracefulListener, Termination};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

/// A listener running on an ephemeral port.
pub struct RunningListener {
    pub addr: SocketAddr,
    signal: Option<oneshot::Sender<Termination>>,
    handle: JoinHandle<()>,
}

/// Bind 127.0.0.1:0 and serve `app` until [`RunningListener::signal`].
pub async fn spawn_listener(
    app: Router,
    log: Arc<dyn Logger>,
    drain_timeout: Option<Duration>,
) -> RunningListener {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();

    let gl = GracefulListener::new(log).drain_timeout(drain_timeout);
    let handle = tokio::spawn(async move {
        gl.serve(listener, app, termination_from(rx)).await;
    });

    RunningListener {
        addr,
        signal: Some(tx),
        handle,
    }
}

/// Resolve when the sender fires. A dropped sender never resolves, like a
/// process that is never signalled.
pub async fn termination_from(rx: oneshot::Receiver<Termination>) -> Termination {
    match rx.await {
        Ok(termination) => termination,
        Err(_) => std::future::pending().await,
    }
}

impl RunningListener {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Deliver the termination signal.
    pub fn signal(&mut self, termination: Termination) {
        self.signal
            .take()
            .expect("signal sent twice")
            .send(termination)
            .expect("listener gone");
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the listener to return, failing the test after `limit`.
    pub async fn join(self, limit: Duration) {
        tokio::time::timeout(limit, self.handle)
            .await
            .expect("listener did not return in time")
            .expect("listener task panicked");
    }
}

//! Single subscription point for process termination signals.
//!
//! OS signal delivery is process-wide. [`ShutdownSignals`] is the only
//! place in the crate that subscribes to SIGINT and SIGTERM, and at most one
//! instance may exist at a time so two listeners never race for the same
//! signal unnoticed.

use std::{
    fmt, io,
    sync::atomic::{AtomicBool, Ordering},
};

static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Which signal requested the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Interrupt from a terminal (SIGINT, Ctrl-C).
    Interrupt,
    /// Termination from a supervisor such as a container orchestrator (SIGTERM).
    Terminate,
}

impl Termination {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("shutdown signals are already claimed by another listener")]
    AlreadyClaimed,

    #[error("failed to install {signal} handler: {source}")]
    Install {
        signal: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Releases the process-wide claim on drop.
#[derive(Debug)]
struct Claim;

impl Claim {
    fn acquire() -> Result<Self, SignalError> {
        CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| SignalError::AlreadyClaimed)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::Release);
    }
}

/// Installed SIGINT/SIGTERM handlers.
///
/// Handlers are registered in [`ShutdownSignals::install`], so signals
/// delivered any time after it returns are observed by [`recv`](Self::recv).
#[derive(Debug)]
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    _claim: Claim,
}

impl ShutdownSignals {
    /// Claim the process's termination signals.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`SignalError::AlreadyClaimed`] while another instance is alive,
    /// or [`SignalError::Install`] if the OS handler cannot be registered.
    #[cfg(unix)]
    pub fn install() -> Result<Self, SignalError> {
        use tokio::signal::unix::{signal, SignalKind};

        let claim = Claim::acquire()?;
        let interrupt = signal(SignalKind::interrupt()).map_err(|source| SignalError::Install {
            signal: Termination::Interrupt.as_str(),
            source,
        })?;
        let terminate = signal(SignalKind::terminate()).map_err(|source| SignalError::Install {
            signal: Termination::Terminate.as_str(),
            source,
        })?;

        Ok(Self {
            interrupt,
            terminate,
            _claim: claim,
        })
    }

    /// Claim the process's termination signals.
    ///
    /// # Errors
    /// Returns [`SignalError::AlreadyClaimed`] while another instance is alive.
    #[cfg(not(unix))]
    pub fn install() -> Result<Self, SignalError> {
        Ok(Self {
            _claim: Claim::acquire()?,
        })
    }

    /// Wait for the first termination signal.
    #[cfg(unix)]
    pub async fn recv(mut self) -> Termination {
        let termination = tokio::select! {
            _ = self.interrupt.recv() => Termination::Interrupt,
            _ = self.terminate.recv() => Termination::Terminate,
        };
        tracing::debug!(signal = %termination, "received termination signal");
        termination
    }

    /// Wait for the first termination signal.
    #[cfg(not(unix))]
    pub async fn recv(self) -> Termination {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        Termination::Interrupt
    }
}

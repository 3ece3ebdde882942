//! Shutdown Signalling
//!
//! Turns OS signals into a shutdown request that long-running dispatch loops can
//! observe. A graceful request lets the in-flight round finish; an urgent one
//! also abandons it. Either way the loop then runs `stop_all`, and agents are
//! never aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Urgent shutdown (SIGQUIT): stop waiting on the in-flight round
    Urgent,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
        }
    }
}

/// Owner side of the shutdown request
pub struct ShutdownController {
    requested: AtomicBool,
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (signal_tx, _) = watch::channel(None);
        Self {
            requested: AtomicBool::new(false),
            signal_tx,
        }
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Request shutdown. A graceful request may escalate to urgent;
    /// anything else after the first request is ignored.
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        self.requested.store(true, Ordering::SeqCst);

        let accepted = self.signal_tx.send_if_modified(|current| match (*current, signal) {
            (None, _) | (Some(ShutdownSignal::Graceful), ShutdownSignal::Urgent) => {
                *current = Some(signal);
                true
            }
            _ => false,
        });

        if accepted {
            info!("Shutdown requested: {}", signal);
        } else {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
        }
    }

    /// Create a token that observes this controller
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            signal_rx: self.signal_tx.subscribe(),
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Token for checking shutdown status in async tasks
#[derive(Clone)]
pub struct ShutdownToken {
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    /// Signal received so far, if any
    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.signal_rx.borrow()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.signal().is_some()
    }

    /// Wait until shutdown is requested
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.signal_rx.borrow_and_update() {
                return signal;
            }
            if self.signal_rx.changed().await.is_err() {
                // Controller dropped without a request
                return ShutdownSignal::Urgent;
            }
        }
    }

    /// Wait until an urgent shutdown is requested, including by escalation
    pub async fn wait_for_urgent(&mut self) {
        loop {
            if *self.signal_rx.borrow_and_update() == Some(ShutdownSignal::Urgent) {
                return;
            }
            if self.signal_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Helper to install OS signal handlers
pub fn install_signal_handlers(shutdown: Arc<ShutdownController>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name, request) in [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ] {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut stream = match signal(kind) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to install {} handler: {}", name, e);
                        return;
                    }
                };
                stream.recv().await;
                info!("Received {}", name);
                shutdown.request_shutdown(request);
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                return;
            }
            info!("Received Ctrl+C");
            shutdown.request_shutdown(ShutdownSignal::Graceful);
        });
    }
}

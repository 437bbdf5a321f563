//! Shutdown signal and the task that drives the shutdown sequence.
//!
//! The coordinator runs beside the accept loop and talks to it through
//! three channels:
//!
//! | Channel | Direction | Carries |
//! |---|---|---|
//! | `watch<bool>` | coordinator → accept loop, connections | "stop accepting, close when idle" |
//! | `mpsc<()>` | connections → coordinator | nothing; every connection holds a sender, drain ends when the last one drops |
//! | `oneshot<Result>` | coordinator → accept loop | the final outcome, sent exactly once |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Dispatch, Span, error, info};

use crate::app::App;
use crate::error::Error;
use crate::server::Lifecycle;

/// Grace window for in-flight requests once shutdown hooks have finished.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

pub(crate) struct Coordinator {
    pub(crate) app: Arc<dyn App>,
    pub(crate) state: Arc<watch::Sender<Lifecycle>>,
    pub(crate) close: watch::Sender<bool>,
    pub(crate) drained: mpsc::Receiver<()>,
    pub(crate) grace: Duration,
}

impl Coordinator {
    /// Waits for `signal`, runs the application's shutdown hooks, then closes
    /// the listener and waits up to the grace window for connections to drain.
    pub(crate) async fn run<S>(mut self, signal: S, outcome: oneshot::Sender<Result<(), Error>>)
    where
        S: Future<Output = ()>,
    {
        signal.await;
        self.state.send_replace(Lifecycle::ShutdownRequested);

        let hooks = self.run_hooks().await;

        self.state.send_replace(Lifecycle::Draining);
        info!(grace = ?self.grace, "draining connections");
        self.close.send_replace(true);

        let drained = match tokio::time::timeout(self.grace, self.drained.recv()).await {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::ShutdownTimeout(self.grace)),
        };

        // The accept loop may already be gone after a fatal accept error.
        let _ = outcome.send(hooks.and(drained));
    }

    /// Hooks are synchronous and unbounded. They run on the blocking pool
    /// under the caller's logger.
    async fn run_hooks(&self) -> Result<(), Error> {
        let app = Arc::clone(&self.app);
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let span = Span::current();

        tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || span.in_scope(|| app.on_shutdown()));
        })
        .await
        .map_err(|e| {
            error!(error = %e, "shutdown hooks did not complete");
            Error::Shutdown(format!("shutdown hooks did not complete: {e}"))
        })
    }
}

// ── OS signals ────────────────────────────────────────────────────────────────

/// Resolves on the first SIGINT (Ctrl-C) or SIGTERM the process receives.
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still does. On non-Unix platforms only Ctrl-C is available.
pub(crate) async fn os_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let signal = tokio::select! {
        s = interrupt => s,
        s = terminate => s,
    };
    info!(signal, "server received shutdown signal");
}

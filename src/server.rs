//! HTTP server and graceful shutdown.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──bind──▶ Listening ──signal──▶ ShutdownRequested ──hooks done──▶ Draining ──drained──▶ Stopped
//!                    │                                                       │
//!                    └──bind / accept failure──▶ Failed ◀──grace elapsed─────┘
//! ```
//!
//! On a shutdown signal the server:
//! 1. Runs [`App::on_shutdown`] to completion. New connections are still
//!    accepted meanwhile.
//! 2. Stops `listener.accept()` and asks every connection to close once its
//!    in-flight request has been answered.
//! 3. Waits up to the grace window (30 s by default) for the last connection
//!    to go away, then returns from [`Server::serve`].
//!
//! Under Kubernetes, set `terminationGracePeriodSeconds` longer than the
//! slowest shutdown hook plus the grace window.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio::time::error::Elapsed;
use tracing::instrument::{Instrument, WithSubscriber};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::app::App;
use crate::error::Error;
use crate::event::RequestEvent;
use crate::handler::BoxedHandler;
use crate::request::Request;
use crate::router::Router;
use crate::shutdown::{self, Coordinator, DEFAULT_GRACE_PERIOD};

/// Where the server is in its lifecycle. Observe it with [`Server::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Listening,
    ShutdownRequested,
    Draining,
    Stopped,
    Failed,
}

impl Lifecycle {
    /// `Stopped` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// The HTTP server.
pub struct Server {
    config: ServerConfig,
    listener: Option<std::net::TcpListener>,
    grace_period: Duration,
    state: Arc<watch::Sender<Lifecycle>>,
}

impl Server {
    /// Configures the server. Values below their floor are replaced by
    /// defaults (see [`ServerConfig::normalize`]).
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use scopehouse::{Server, ServerConfig};
    /// let server = Server::new(ServerConfig { port: 3000, ..ServerConfig::default() });
    /// ```
    pub fn new(config: ServerConfig) -> Self {
        let (state, _) = watch::channel(Lifecycle::Idle);
        Self {
            config: config.normalize(),
            listener: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            state: Arc::new(state),
        }
    }

    /// Serves on an already bound socket instead of `0.0.0.0:{port}`.
    pub fn with_listener(mut self, listener: std::net::TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Overrides the drain window that follows the shutdown hooks.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// The normalized configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Subscribes to lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<Lifecycle> {
        self.state.subscribe()
    }

    /// Serves `router` until SIGINT or SIGTERM, then shuts down gracefully.
    ///
    /// Returns `Ok(())` once the server has [`Stopped`](Lifecycle::Stopped)
    /// and an error if it [`Failed`](Lifecycle::Failed).
    pub async fn serve(self, app: Arc<dyn App>, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(app, router, shutdown::os_signal()).await
    }

    /// Like [`serve`](Server::serve), with `signal` as the only shutdown
    /// trigger.
    pub async fn serve_with_shutdown<S>(
        self,
        app: Arc<dyn App>,
        router: Router,
        signal: S,
    ) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let dispatch = app.logger().dispatch().clone();
        let span = app.logger().span();
        self.run(app, router, signal).instrument(span).with_subscriber(dispatch).await
    }

    async fn run<S>(self, app: Arc<dyn App>, router: Router, signal: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let Self { config, listener, grace_period, state } = self;

        let listener = match bind(config.addr(), listener).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "server failed to start");
                state.send_replace(Lifecycle::Failed);
                return Err(e);
            }
        };
        let port = listener.local_addr().map_or(config.port, |a| a.port());
        state.send_replace(Lifecycle::Listening);
        info!(port, "server starting");

        let (close_tx, close_rx) = watch::channel(false);
        let (drain_tx, drained) = mpsc::channel::<()>(1);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let coordinator = Coordinator {
            app: Arc::clone(&app),
            state: Arc::clone(&state),
            close: close_tx,
            drained,
            grace: grace_period,
        };
        let shutdown = tokio::spawn(coordinator.run(signal, outcome_tx).in_current_span().with_current_subscriber());

        let conns = Arc::new(Connections { app, handler: router.build(), config });
        let mut closing = close_rx.clone();
        let mut backoff = Duration::ZERO;

        loop {
            tokio::select! {
                // Check the close signal first so no connection is accepted
                // after it fires, even with more queued.
                biased;

                _ = closing.changed() => break,

                res = listener.accept() => match res {
                    Ok((stream, peer)) => {
                        backoff = Duration::ZERO;
                        let task = serve_connection(
                            stream,
                            peer,
                            Arc::clone(&conns),
                            close_rx.clone(),
                            drain_tx.clone(),
                        );
                        tokio::spawn(task.in_current_span().with_current_subscriber());
                    }
                    Err(e) if is_transient(&e) => {
                        debug!(error = %e, "transient accept error");
                    }
                    Err(e) if is_resource_exhausted(&e) => {
                        backoff = next_backoff(backoff);
                        warn!(error = %e, retry_in_ms = backoff.as_millis() as u64, "accept failed, retrying");
                        tokio::select! {
                            biased;
                            _ = closing.changed() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        shutdown.abort();
                        state.send_replace(Lifecycle::Failed);
                        return Err(Error::Accept(e));
                    }
                },
            }
        }

        drop(listener);
        drop(drain_tx);

        let outcome = outcome_rx.await.unwrap_or_else(|_| {
            Err(Error::Shutdown("shutdown task ended without an outcome".to_owned()))
        });
        match outcome {
            Ok(()) => {
                state.send_replace(Lifecycle::Stopped);
                info!("server stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "server shutdown failed");
                state.send_replace(Lifecycle::Failed);
                Err(e)
            }
        }
    }
}

async fn bind(addr: SocketAddr, listener: Option<std::net::TcpListener>) -> Result<TcpListener, Error> {
    match listener {
        Some(listener) => {
            let addr = listener.local_addr().unwrap_or(addr);
            listener
                .set_nonblocking(true)
                .and_then(|()| TcpListener::from_std(listener))
                .map_err(|source| Error::Bind { addr, source })
        }
        None => TcpListener::bind(addr).await.map_err(|source| Error::Bind { addr, source }),
    }
}

/// Accept errors that concern one connection, not the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// Accept errors from running out of descriptors or memory. The listener
/// is still usable once some connections close.
fn is_resource_exhausted(e: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;

    e.kind() == io::ErrorKind::OutOfMemory
        || (cfg!(unix) && matches!(e.raw_os_error(), Some(ENFILE | EMFILE)))
}

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

fn next_backoff(prev: Duration) -> Duration {
    (prev * 2).clamp(MIN_ACCEPT_BACKOFF, MAX_ACCEPT_BACKOFF)
}

// ── Connections ───────────────────────────────────────────────────────────────

/// State shared by every connection task.
struct Connections {
    app: Arc<dyn App>,
    handler: BoxedHandler,
    config: ServerConfig,
}

impl Connections {
    /// Core hot path: one request in, one response out.
    ///
    /// A handler that outlives the write timeout fails the service call,
    /// which makes hyper drop the connection without a response.
    async fn respond(
        &self,
        req: hyper::Request<Incoming>,
    ) -> Result<http::Response<Full<Bytes>>, Elapsed> {
        let ev = RequestEvent::new(Request::new(req), Arc::clone(&self.app));
        match tokio::time::timeout(self.config.write_timeout, self.handler.call(ev)).await {
            Ok(res) => Ok(res.into_hyper()),
            Err(elapsed) => {
                warn!(timeout = ?self.config.write_timeout, "write timeout elapsed, aborting connection");
                Err(elapsed)
            }
        }
    }
}

/// Drives one connection until the peer leaves, it idles out, or shutdown
/// asks it to close. Holding `_drain` keeps the shutdown drain open.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    conns: Arc<Connections>,
    mut closing: watch::Receiver<bool>,
    _drain: mpsc::Sender<()>,
) {
    let config = conns.config;
    let activity = Arc::new(Activity::new());

    let svc = {
        let activity = Arc::clone(&activity);
        service_fn(move |req: hyper::Request<Incoming>| {
            let conns = Arc::clone(&conns);
            let in_flight = activity.begin();
            async move {
                let _in_flight = in_flight;
                conns.respond(req).await
            }
        })
    };

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(config.read_timeout);

    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let mut closing_down = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(%peer, error = %e, "connection closed with error");
                }
                break;
            }
            _ = closing.changed(), if !closing_down => {
                conn.as_mut().graceful_shutdown();
                closing_down = true;
            }
            () = activity.idle_for(config.idle_timeout), if !closing_down => {
                debug!(%peer, "closing idle connection");
                conn.as_mut().graceful_shutdown();
                closing_down = true;
            }
        }
    }
}

/// Request activity on one connection, for the idle timeout.
struct Activity {
    in_flight: AtomicUsize,
    last_active: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self { in_flight: AtomicUsize::new(0), last_active: Mutex::new(Instant::now()) }
    }

    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(Arc::clone(self))
    }

    fn last_active(&self) -> Instant {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves once no request has been in flight for `limit`.
    async fn idle_for(&self, limit: Duration) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(limit).await;
                continue;
            }
            let deadline = self.last_active() + limit;
            if deadline <= Instant::now() {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// Marks a request in flight until dropped.
struct InFlight(Arc<Activity>);

impl Drop for InFlight {
    fn drop(&mut self) {
        *self.0.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

//! Shared fixtures for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use scopehouse::{App, Error, Lifecycle, Logger, MemoryUserStore, Router, Server, ServerConfig, UserStore};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// An [`App`] that logs nowhere and counts shutdown hook runs.
pub struct TestApp {
    logger: Logger,
    users: MemoryUserStore,
    shutdowns: AtomicUsize,
}

impl TestApp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            logger: Logger::discard(),
            users: MemoryUserStore::new(),
            shutdowns: AtomicUsize::new(0),
        })
    }

    #[allow(dead_code)]
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl App for TestApp {
    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn users(&self) -> &dyn UserStore {
        &self.users
    }

    fn bootstrap(&self) -> Result<(), Error> {
        Ok(())
    }

    fn on_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// A server running on `127.0.0.1` with an ephemeral port, stopped by
/// [`TestServer::signal`] instead of an OS signal.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: watch::Receiver<Lifecycle>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), Error>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Delivers the shutdown signal.
    pub fn signal(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Signals, then waits for `serve` to return.
    pub async fn stop(mut self) -> Result<(), Error> {
        self.signal();
        self.task.await.expect("server task panicked")
    }
}

#[allow(dead_code)]
pub fn spawn(app: Arc<TestApp>, router: Router) -> TestServer {
    spawn_with(app, router, |server| server)
}

/// Like [`spawn`], letting the caller adjust the server before it starts.
pub fn spawn_with(
    app: Arc<TestApp>,
    router: Router,
    configure: impl FnOnce(Server) -> Server,
) -> TestServer {
    spawn_server(app, router, configure(Server::new(ServerConfig::default())))
}

#[allow(dead_code)]
pub fn spawn_config(app: Arc<TestApp>, router: Router, config: ServerConfig) -> TestServer {
    spawn_server(app, router, Server::new(config))
}

fn spawn_server(app: Arc<TestApp>, router: Router, server: Server) -> TestServer {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = server.with_listener(listener);
    let state = server.state();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve_with_shutdown(app, router, async move {
        let _ = stopped.await;
    }));

    TestServer { addr, state, stop: Some(stop), task }
}

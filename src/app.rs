//! The application capability handed to every request and to the server.
//!
//! [`App`] is the whole surface the runtime depends on: a logger, data
//! access, a bootstrap step and shutdown hooks. [`BaseApp`] is the
//! production implementation; tests implement the trait on their own types.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::data::UserStore;
use crate::error::Error;
use crate::logging::Logger;

pub trait App: Send + Sync + 'static {
    /// The logger every request and server task runs under.
    fn logger(&self) -> &Logger;

    /// User data access.
    fn users(&self) -> &dyn UserStore;

    /// Validates and initializes the application before it serves.
    fn bootstrap(&self) -> Result<(), Error>;

    /// Runs application jobs that must finish before the listener drains.
    /// Called once, synchronously, when a shutdown signal arrives.
    fn on_shutdown(&self);
}

type ShutdownHook = Box<dyn Fn() + Send + Sync + 'static>;

/// Production [`App`].
pub struct BaseApp {
    logger: Logger,
    users: Arc<dyn UserStore>,
    hooks: Vec<(String, ShutdownHook)>,
    bootstrapped: AtomicBool,
}

impl BaseApp {
    pub fn new(logger: Logger, users: Arc<dyn UserStore>) -> Self {
        Self { logger, users, hooks: Vec::new(), bootstrapped: AtomicBool::new(false) }
    }

    /// Registers a job to run on shutdown. Hooks run in registration order.
    pub fn with_shutdown_hook(
        mut self,
        name: impl Into<String>,
        hook: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.hooks.push((name.into(), Box::new(hook)));
        self
    }
}

impl App for BaseApp {
    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    fn bootstrap(&self) -> Result<(), Error> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Err(Error::Bootstrap("application already bootstrapped".to_owned()));
        }
        tracing::dispatcher::with_default(self.logger.dispatch(), || {
            info!(shutdown_hooks = self.hooks.len(), "application bootstrapped");
        });
        Ok(())
    }

    fn on_shutdown(&self) {
        for (name, hook) in &self.hooks {
            info!(hook = %name, "running shutdown hook");
            hook();
        }
    }
}

impl std::fmt::Debug for BaseApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseApp")
            .field("hooks", &self.hooks.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::data::MemoryUserStore;

    #[test]
    fn bootstrap_runs_once() {
        let app = BaseApp::new(Logger::discard(), Arc::new(MemoryUserStore::new()));
        assert!(app.bootstrap().is_ok());
        assert!(matches!(app.bootstrap(), Err(Error::Bootstrap(_))));
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&ran), Arc::clone(&ran));
        let app = BaseApp::new(Logger::discard(), Arc::new(MemoryUserStore::new()))
            .with_shutdown_hook("a", move || a.lock().unwrap().push("a"))
            .with_shutdown_hook("b", move || b.lock().unwrap().push("b"));

        app.on_shutdown();
        assert_eq!(*ran.lock().unwrap(), ["a", "b"]);
    }
}

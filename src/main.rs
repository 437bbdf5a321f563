use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use scopehouse::{App, BaseApp, Config, Error, Logger, MemoryUserStore, Server, WithDeadline, apis};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[error] {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;
    let logger = Logger::new(&config.log);

    let users = WithDeadline::new(MemoryUserStore::new(), config.users_lookup_timeout);
    let app = BaseApp::new(logger, Arc::new(users))
        .with_shutdown_hook("flush log output", || {
            let _ = std::io::stderr().flush();
        });
    app.bootstrap()?;

    Server::new(config.server).serve(Arc::new(app), apis::router()).await
}

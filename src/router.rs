//! Radix-tree request router and middleware composition.
//!
//! One tree per HTTP method plus one for patterns registered without a
//! method. O(path-length) lookup. Routes and middleware are registered once
//! at startup; [`Router::build`] freezes them into a single handler.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::event::RequestEvent;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::middleware::Middleware;
use crate::writer::write_status;

type Tree = MatchitRouter<BoxedHandler>;

/// The application router.
///
/// Each registration returns `self` so calls chain naturally:
///
/// ```rust,no_run
/// # use scopehouse::{RequestEvent, Response, Router, middleware, write_status};
/// # use http::StatusCode;
/// # async fn get_user(_: RequestEvent) -> Response { write_status(StatusCode::OK) }
/// # async fn create_user(_: RequestEvent) -> Response { write_status(StatusCode::CREATED) }
/// let handler = Router::new()
///     .register("GET /users/{email}", get_user)
///     .post("/users", create_user)
///     .middleware(middleware::trace())
///     .build();
/// ```
pub struct Router {
    routes: HashMap<Method, Tree>,
    any: Tree,
    middleware: Vec<Box<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), any: Tree::new(), middleware: Vec::new() }
    }

    /// Registers a handler for a `"METHOD /path"` pattern, or for `"/path"`
    /// on every method.
    ///
    /// # Panics
    ///
    /// Panics if the method is not a valid token, or if the path is invalid
    /// or already registered for that method.
    pub fn register(self, pattern: &str, handler: impl Handler) -> Self {
        let pattern = pattern.trim();
        match pattern.split_once(char::is_whitespace) {
            Some((method, path)) if !method.starts_with('/') => {
                let method = Method::from_bytes(method.as_bytes())
                    .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
                self.on(method, path.trim_start(), handler)
            }
            _ => self.any(pattern, handler),
        }
    }

    /// Registers a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are read with
    /// [`Request::param`](crate::Request::param).
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        insert(self.routes.entry(method).or_default(), path, handler);
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    /// Registers a handler for `path` on every method.
    pub fn any(mut self, path: &str, handler: impl Handler) -> Self {
        insert(&mut self.any, path, handler);
        self
    }

    /// Appends a middleware. The last one appended runs first.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Composes route dispatch and middleware into one handler.
    ///
    /// Starting from route dispatch, each middleware in registration order
    /// wraps the handler built so far. The first registered ends up closest
    /// to the route handler and the last registered is the outermost layer.
    pub fn build(self) -> BoxedHandler {
        let table = RouteTable { routes: self.routes, any: self.any };
        let mut handler: BoxedHandler = Arc::new(table);
        for m in &self.middleware {
            handler = m.wrap(handler);
        }
        handler
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn insert(tree: &mut Tree, path: &str, handler: impl Handler) {
    tree.insert(path, handler.into_boxed_handler())
        .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

struct RouteTable {
    routes: HashMap<Method, Tree>,
    any: Tree,
}

enum Route {
    Found(BoxedHandler, HashMap<String, String>),
    MethodNotAllowed(String),
    NotFound,
}

impl RouteTable {
    fn lookup(&self, method: &Method, path: &str) -> Route {
        let trees = [
            self.routes.get(method),
            (*method == Method::HEAD).then(|| self.routes.get(&Method::GET)).flatten(),
            Some(&self.any),
        ];
        for tree in trees.into_iter().flatten() {
            if let Ok(matched) = tree.at(path) {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                return Route::Found(Arc::clone(matched.value), params);
            }
        }

        let mut allowed: Vec<&str> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| m.as_str())
            .collect();
        if allowed.is_empty() {
            return Route::NotFound;
        }
        if allowed.contains(&"GET") && !allowed.contains(&"HEAD") {
            allowed.push("HEAD");
        }
        allowed.sort_unstable();
        Route::MethodNotAllowed(allowed.join(", "))
    }
}

impl ErasedHandler for RouteTable {
    fn call(&self, mut ev: RequestEvent) -> BoxFuture {
        match self.lookup(ev.request().method(), ev.request().path()) {
            Route::Found(handler, params) => {
                ev.request_mut().set_params(params);
                handler.call(ev)
            }
            Route::MethodNotAllowed(allow) => Box::pin(async move {
                let mut res = write_status(StatusCode::METHOD_NOT_ALLOWED);
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    res.headers_mut().insert(ALLOW, value);
                }
                res
            }),
            Route::NotFound => Box::pin(async { write_status(StatusCode::NOT_FOUND) }),
        }
    }
}

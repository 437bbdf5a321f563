//! Fixtures shared by unit tests.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;

use crate::app::BaseApp;
use crate::data::MemoryUserStore;
use crate::event::RequestEvent;
use crate::logging::Logger;
use crate::request::Request;

pub(crate) fn event(method: &str, path: &str, body: &'static str) -> RequestEvent {
    let req = http::Request::builder()
        .method(method)
        .uri(path)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap();
    let app = Arc::new(BaseApp::new(Logger::discard(), Arc::new(MemoryUserStore::new())));
    RequestEvent::new(Request::new(req), app)
}

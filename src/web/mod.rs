// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operator web interface.
//!
//! | Request | Response |
//! |---|---|
//! | `GET /` | HTML status page with the command form |
//! | `POST /` | applies the form command, renders the page with the result |
//! | `GET /status` | JSON [`Snapshot`](crate::state::Snapshot) |
//!
//! A form naming an unknown printer or an invalid `cmd` gets `400 Bad Request`.
//! Form bodies larger than [`MAX_FORM_BYTES`] get `413 Payload Too Large`.
//! There is no authentication.

mod form;
mod page;

use std::net::SocketAddr;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Method, StatusCode};
use tokio::net::{TcpListener, TcpStream};

use crate::engine::{Command, Engine};
use crate::error::Result;

pub use form::{FormError, FormRequest, parse_form};
pub use page::render_page;

/// Result of a request handler.
pub type HttpResult<E = std::io::Error> = std::result::Result<HttpResponse, E>;

/// Response type of every handler.
pub type HttpResponse =
    hyper::Response<http_body_util::combinators::BoxBody<hyper::body::Bytes, std::io::Error>>;

const HTML: &str = "text/html; charset=utf-8";
const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Largest accepted `POST /` body.
pub const MAX_FORM_BYTES: usize = 4 * 1024;

/// Binds `addr` and serves the web interface until the task is dropped.
///
/// # Errors
///
/// Returns error if the address cannot be bound.
pub async fn run_server(addr: SocketAddr, engine: Engine) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, engine).await
}

/// Serves the web interface on an already bound listener.
///
/// # Errors
///
/// Returns error if the listener's local address cannot be read.
pub async fn serve(listener: TcpListener, engine: Engine) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "Web interface listening");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::trace!(%peer, "Accepted connection");
                tokio::spawn(handle_connection(stream, engine.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, engine: Engine) {
    let io = hyper_util::rt::TokioIo::new(stream);
    let builder =
        hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new());
    let service = hyper::service::service_fn(move |r| handle_request(r, engine.clone()));

    if let Err(e) = builder.serve_connection(io, service).await {
        tracing::debug!(error = %e, "Connection error");
    }
}

async fn handle_request(r: hyper::Request<hyper::body::Incoming>, engine: Engine) -> HttpResult {
    tracing::debug!(method = %r.method(), path = r.uri().path(), "HTTP request");
    match (r.method(), r.uri().path()) {
        (&Method::GET, "/") => html(&render_page(&engine.snapshot(), None), StatusCode::OK),
        (&Method::POST, "/") => handle_form(r, &engine).await,
        (&Method::GET, "/status") => json(&engine.snapshot()),
        (_, "/" | "/status") => text("method not allowed", StatusCode::METHOD_NOT_ALLOWED),
        (_, path) => text(&format!("not found: {path}"), StatusCode::NOT_FOUND),
    }
}

async fn handle_form(r: hyper::Request<hyper::body::Incoming>, engine: &Engine) -> HttpResult {
    let body = match read_body(r.into_body(), MAX_FORM_BYTES).await {
        Ok(body) => body,
        Err(status) if status == StatusCode::PAYLOAD_TOO_LARGE => {
            return text("form body too large", status);
        }
        Err(_) => return bad_request("failed to read body"),
    };
    let Ok(body) = std::str::from_utf8(&body) else {
        return bad_request("form body is not utf-8");
    };

    let form = match parse_form(body) {
        Ok(form) => form,
        Err(e) => {
            tracing::info!(error = %e, "Rejected web form");
            return bad_request(&e.to_string());
        }
    };
    let Some(target) = engine.resolve_target(&form.printer) else {
        tracing::info!(device = %form.printer, "Web command for unknown device");
        return bad_request(&format!("unknown device: {}", form.printer));
    };

    let result = engine.submit(Command {
        target,
        action: form.action,
    });
    html(&render_page(&engine.snapshot(), Some(&result)), StatusCode::OK)
}

/// Collects at most `limit` bytes of `body`.
async fn read_body<B>(body: B, limit: usize) -> std::result::Result<hyper::body::Bytes, StatusCode>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            tracing::info!(limit, "Rejected oversized request body");
            Err(StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read request body");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

/// Serializes `o` as a JSON response.
pub fn json<T: serde::Serialize>(o: &T) -> HttpResult {
    match serde_json::to_vec(o) {
        Ok(bytes) => with_content_type(bytes_to_resp(bytes, StatusCode::OK)?, JSON),
        Err(e) => text(
            &format!("failed to serialize json: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

fn html(body: &str, status: StatusCode) -> HttpResult {
    with_content_type(bytes_to_resp(body.as_bytes().to_vec(), status)?, HTML)
}

fn text(body: &str, status: StatusCode) -> HttpResult {
    with_content_type(bytes_to_resp(body.as_bytes().to_vec(), status)?, TEXT)
}

fn bad_request(message: &str) -> HttpResult {
    text(message, StatusCode::BAD_REQUEST)
}

/// Wraps raw bytes into a response with the given status.
pub fn bytes_to_resp(bytes: Vec<u8>, status: StatusCode) -> HttpResult {
    let mut r = hyper::Response::new(
        http_body_util::Full::new(hyper::body::Bytes::from(bytes))
            .map_err(|e| match e {})
            .boxed(),
    );
    *r.status_mut() = status;
    Ok(r)
}

#[allow(clippy::unnecessary_wraps)]
fn with_content_type(mut r: HttpResponse, content_type: &'static str) -> HttpResult {
    r.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    Ok(r)
}

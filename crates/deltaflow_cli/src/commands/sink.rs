//! Sink command implementation.
//!
//! A stand-in for the real consumer: accepts streamed POSTs and prints the
//! body bytes as they arrive.

use super::SinkArgs;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use futures::StreamExt;
use std::io::Write;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, warn};

/// Something that happened to an incoming stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A POST started.
    Opened,
    /// A piece of the body arrived.
    Chunk(Bytes),
    /// The body ended cleanly.
    Closed,
    /// The body failed before its end.
    Failed(String),
}

/// Runs the sink command until Ctrl-C.
pub fn run(args: &SinkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(&args.addr))
}

async fn serve(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "sink accepting connections");

    let (events, mut received) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = received.recv().await {
            print_event(&event);
        }
    });

    axum::serve(listener, router(events))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn print_event(event: &SinkEvent) {
    let mut out = std::io::stdout().lock();
    let _ = match event {
        SinkEvent::Opened => writeln!(out, "Sink received a connection"),
        SinkEvent::Chunk(bytes) => out.write_all(bytes),
        SinkEvent::Closed => writeln!(out),
        SinkEvent::Failed(e) => writeln!(out, "\nStream failed: {e}"),
    };
    let _ = out.flush();
}

/// Builds the sink's routes. Every path accepts POST; other methods get 405.
pub fn router(events: UnboundedSender<SinkEvent>) -> Router {
    Router::new()
        .route("/", post(ingest))
        .route("/{*path}", post(ingest))
        .with_state(events)
}

async fn ingest(State(events): State<UnboundedSender<SinkEvent>>, body: Body) -> StatusCode {
    let _ = events.send(SinkEvent::Opened);

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                let _ = events.send(SinkEvent::Chunk(bytes));
            }
            Err(e) => {
                warn!(error = %e, "incoming stream failed");
                let _ = events.send(SinkEvent::Failed(e.to_string()));
                return StatusCode::BAD_REQUEST;
            }
        }
    }

    let _ = events.send(SinkEvent::Closed);
    StatusCode::OK
}

mod ai;
mod auth;
mod context;
mod departments;
mod docs;
mod errors;
mod offices;
mod queue;
mod schemas;
mod serialized;
mod sse;

use std::{
    io,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use waitwise_collab::Collab;

pub use context::ServerContext;
pub use sse::ServerSentEvents;

pub type Router = axum::Router<ServerContext>;

/// Starts the WaitWise server, running until it fails
pub async fn run_server(collab: Arc<Collab>, sse: Arc<ServerSentEvents>) -> io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, collab.config.port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let context = ServerContext { collab, sse };

    let root_router = Router::new()
        .nest("/api", api_router())
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, root_router).await
}

fn api_router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/queue", queue::router())
        .nest("/ai", ai::router())
        .nest("/department", departments::router())
        .nest("/office", offices::router())
}

//! Demo status site.
//!
//! Bootstraps a status manager, issues one credential, and serves status
//! credentials the way the public read endpoint must:
//! `GET /{statusCredentialId}` returns the status credential JSON, 404 when
//! unknown.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use credibil_status::signer::Keyring;
use credibil_status::store::mem::MemStore;
use credibil_status::{Error, Kind, Options, StatusManager, create_status_manager};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let manager = create_status_manager(Options {
        status_credential_site_origin: "http://localhost:8080".to_string(),
        did_seed: "DsnrHBHFQP0ab59dQELh3uEwy7i5ArcOTwxkwRO2hM87CBRGWBEChPO7AjmwkAZ2".to_string(),
        ..Options::default()
    })
    .await?;

    // issue one credential so the site has a populated list to serve
    let credential = serde_json::from_value(serde_json::json!({
        "@context": ["https://www.w3.org/ns/credentials/v2"],
        "id": "https://credentials.example.edu/3732",
        "type": ["VerifiableCredential", "EmployeeIDCredential"],
        "issuer": "did:example:issuer",
        "credentialSubject": {"id": "did:example:abcdef"}
    }))?;
    let credential = manager.allocate_supported_statuses(Kind::Object(credential)).await?;
    tracing::info!("issued: {}", serde_json::to_string_pretty(&credential)?);

    let router = Router::new().route("/{id}", get(status_credential)).with_state(manager);

    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}

async fn status_credential(
    State(manager): State<StatusManager<MemStore, Keyring>>, Path(id): Path<String>,
) -> Response {
    match manager.get_status_credential(&id).await {
        Ok(record) => Json(record.credential).into_response(),
        Err(Error::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!("issue retrieving status credential: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

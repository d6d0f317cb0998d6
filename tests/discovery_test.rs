//! Discovery resolver integration tests against in-process mock servers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Json, Router, http::StatusCode, routing::get};
use serde_json::{Value, json};

use mcp_connect::{ConnectorConfig, Error, OAuthConnector};

/// Bind an ephemeral port, return its base URL, and serve `make_app(base)`
/// in the background.
async fn serve_with_base(make_app: impl FnOnce(String) -> Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = make_app(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn json_route(doc: Value) -> axum::routing::MethodRouter {
    get(move || {
        let doc = doc.clone();
        async move { Json(doc) }
    })
}

fn connector() -> OAuthConnector {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    OAuthConnector::new(ConnectorConfig::new(
        "Test Host",
        "http://localhost:8080/callback",
        b"test-secret".to_vec(),
    ))
    .unwrap()
}

#[tokio::test]
async fn test_discovers_server_with_only_root_openid_configuration() {
    // No protected-resource metadata, no path-scoped variants: the chain
    // must fall through to the root openid-configuration document.
    let base = serve_with_base(|base| {
        Router::new().route(
            "/.well-known/openid-configuration",
            json_route(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "code_challenge_methods_supported": ["S256"],
            })),
        )
    })
    .await;

    let metadata = connector().discover(&base).await.unwrap();
    assert_eq!(metadata.authorization_endpoint, format!("{base}/authorize"));
    assert_eq!(metadata.token_endpoint, format!("{base}/token"));
    assert_eq!(metadata.authorization_server, base);
    assert_eq!(metadata.resource, base);
    assert!(metadata.registration_endpoint.is_none());
}

#[tokio::test]
async fn test_protected_resource_metadata_selects_authorization_server() {
    // The resource server and the authorization server are different
    // origins; the resource's metadata points at the right one.
    let auth_base = serve_with_base(|base| {
        Router::new().route(
            "/.well-known/oauth-authorization-server",
            json_route(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "registration_endpoint": format!("{base}/register"),
                "scopes_supported": ["mcp:read", "mcp:write"],
                "code_challenge_methods_supported": ["S256"],
            })),
        )
    })
    .await;

    let auth_for_prm = auth_base.clone();
    let resource_base = serve_with_base(move |base| {
        Router::new().route(
            "/.well-known/oauth-protected-resource",
            json_route(json!({
                "resource": base,
                "authorization_servers": [auth_for_prm],
            })),
        )
    })
    .await;

    let metadata = connector().discover(&resource_base).await.unwrap();
    assert_eq!(metadata.resource, resource_base);
    assert_eq!(metadata.authorization_server, auth_base);
    assert_eq!(
        metadata.authorization_endpoint,
        format!("{auth_base}/authorize")
    );
    assert_eq!(metadata.token_endpoint, format!("{auth_base}/token"));
    assert_eq!(
        metadata.registration_endpoint,
        Some(format!("{auth_base}/register"))
    );
    assert_eq!(
        metadata.scopes_supported,
        Some(vec!["mcp:read".to_string(), "mcp:write".to_string()])
    );
}

#[tokio::test]
async fn test_issuer_mismatch_rejects_endpoint_but_tries_next_candidate() {
    // The RFC 8414 endpoint serves a spoofed issuer; the OIDC endpoint is
    // honest. Discovery must reject the first and accept the second.
    let base = serve_with_base(|base| {
        Router::new()
            .route(
                "/.well-known/oauth-authorization-server",
                json_route(json!({
                    "issuer": "https://attacker.example.com",
                    "authorization_endpoint": "https://attacker.example.com/authorize",
                    "token_endpoint": "https://attacker.example.com/token",
                })),
            )
            .route(
                "/.well-known/openid-configuration",
                json_route(json!({
                    "issuer": base,
                    "authorization_endpoint": format!("{base}/authorize"),
                    "token_endpoint": format!("{base}/token"),
                })),
            )
    })
    .await;

    let metadata = connector().discover(&base).await.unwrap();
    assert_eq!(metadata.authorization_server, base);
    assert_eq!(metadata.token_endpoint, format!("{base}/token"));
}

#[tokio::test]
async fn test_issuer_mismatch_everywhere_is_a_discovery_failure() {
    let base = serve_with_base(|_base| {
        let spoofed = json!({
            "issuer": "https://attacker.example.com",
            "authorization_endpoint": "https://attacker.example.com/authorize",
            "token_endpoint": "https://attacker.example.com/token",
        });
        Router::new()
            .route(
                "/.well-known/oauth-authorization-server",
                json_route(spoofed.clone()),
            )
            .route("/.well-known/openid-configuration", json_route(spoofed))
    })
    .await;

    let err = connector().discover(&base).await.unwrap_err();
    match err {
        Error::Discovery(message) => {
            assert!(
                message.contains("does not support discoverable OAuth"),
                "unexpected message: {message}"
            );
        }
        other => panic!("expected Discovery failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_token_endpoint_names_the_field() {
    let base = serve_with_base(|base| {
        Router::new().route(
            "/.well-known/openid-configuration",
            json_route(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
            })),
        )
    })
    .await;

    let err = connector().discover(&base).await.unwrap_err();
    match err {
        Error::Discovery(message) => {
            assert!(
                message.contains("token_endpoint"),
                "message should name the missing field: {message}"
            );
        }
        other => panic!("expected Discovery failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_authorization_endpoint_names_the_field() {
    let base = serve_with_base(|base| {
        Router::new().route(
            "/.well-known/openid-configuration",
            json_route(json!({
                "issuer": base,
                "token_endpoint": format!("{base}/token"),
            })),
        )
    })
    .await;

    let err = connector().discover(&base).await.unwrap_err();
    match err {
        Error::Discovery(message) => {
            assert!(
                message.contains("authorization_endpoint"),
                "message should name the missing field: {message}"
            );
        }
        other => panic!("expected Discovery failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unresponsive_server_times_out_instead_of_hanging() {
    async fn hang() -> StatusCode {
        std::future::pending::<()>().await;
        StatusCode::OK
    }

    let base = serve_with_base(|_base| Router::new().fallback(hang)).await;

    let mut config = ConnectorConfig::new(
        "Test Host",
        "http://localhost:8080/callback",
        b"test-secret".to_vec(),
    );
    config.discovery_timeout = Duration::from_millis(200);
    let connector = OAuthConnector::new(config).unwrap();

    let err = connector.discover(&base).await.unwrap_err();
    assert!(matches!(err, Error::Timeout), "got {err:?}");
}

#[tokio::test]
async fn test_second_discovery_is_served_from_the_cache() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_route = hits.clone();

    let base = serve_with_base(move |base| {
        let doc = json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
        });
        Router::new().route(
            "/.well-known/openid-configuration",
            get(move || {
                let doc = doc.clone();
                let hits = hits_for_route.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(doc)
                }
            }),
        )
    })
    .await;

    let connector = connector();
    connector.discover(&base).await.unwrap();
    connector.discover(&base).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

//! Integration tests for the login and logout flows

use std::sync::Arc;

use interntrack_client::api::auth::{self, LoginError};
use interntrack_client::api::types::Role;
use interntrack_client::api::ApiClient;
use interntrack_client::guard::Redirect;
use interntrack_client::session::{MemoryRepository, SessionUpdate, TokenStore};
use mockito::{Matcher, Server, ServerGuard};

fn client_for(server: &ServerGuard, repo: &Arc<MemoryRepository>) -> ApiClient {
    ApiClient::with_http(
        reqwest::Client::new(),
        &format!("{}/api/", server.url()),
        TokenStore::new(repo.clone()),
        Redirect::to("login.html"),
    )
}

#[tokio::test]
async fn login_stores_tokens_and_identity() {
    //* Given
    let mut server = Server::new_async().await;
    let repo = Arc::new(MemoryRepository::new());

    let token = server
        .mock("POST", "/api/token/")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(serde_json::json!({
            "email": "ira@example.com",
            "password": "hunter22"
        })))
        .with_status(200)
        .with_body(r#"{"access":"a1","refresh":"r1"}"#)
        .expect(1)
        .create_async()
        .await;
    let me = server
        .mock("GET", "/api/me/")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_body(
            r#"{"id":7,"role":"INTERN","full_name":"Ira Novak","email":"ira@example.com","department":"QA"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    //* When
    let client = client_for(&server, &repo);
    let identity = auth::login(&client, "  ira@example.com ", "hunter22")
        .await
        .expect("login should succeed");

    //* Then
    token.assert_async().await;
    me.assert_async().await;
    assert_eq!(identity.role, Role::Intern);
    assert_eq!(identity.display_name(), "Ira Novak");
    assert_eq!(identity.extra["department"], "QA");

    let store = client.store();
    assert_eq!(store.get_access(), "a1");
    assert_eq!(store.get_refresh(), "r1");
    assert_eq!(store.get_identity(), Some(identity));
}

#[tokio::test]
async fn login_replaces_previous_session() {
    //* Given
    let mut server = Server::new_async().await;
    let repo = Arc::new(MemoryRepository::new());
    let client = client_for(&server, &repo);
    client
        .store()
        .set_session(SessionUpdate::access("stale").with_refresh("stale-r"))
        .unwrap();

    let _token = server
        .mock("POST", "/api/token/")
        .with_status(200)
        .with_body(r#"{"access":"a1","refresh":"r1"}"#)
        .create_async()
        .await;
    let _me = server
        .mock("GET", "/api/me/")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_body(r#"{"role":"SUPERVISOR","name":"Sam"}"#)
        .create_async()
        .await;

    //* When
    let identity = auth::login(&client, "sam@example.com", "pw").await.unwrap();

    //* Then
    assert_eq!(identity.role, Role::Supervisor);
    assert_eq!(client.store().get_access(), "a1");
    assert_eq!(client.store().get_refresh(), "r1");
}

#[tokio::test]
async fn unverified_account_is_reported_with_redirect() {
    //* Given
    let mut server = Server::new_async().await;
    let repo = Arc::new(MemoryRepository::new());

    let _token = server
        .mock("POST", "/api/token/")
        .with_status(403)
        .with_body(
            r#"{"detail":"Please verify your email before logging in.","action":"VERIFY_EMAIL","redirect_url":"/verify-email.html"}"#,
        )
        .create_async()
        .await;
    let me = server.mock("GET", "/api/me/").expect(0).create_async().await;

    //* When
    let client = client_for(&server, &repo);
    let result = auth::login(&client, "new@example.com", "pw").await;

    //* Then
    me.assert_async().await;
    match result {
        Err(LoginError::NotVerified {
            detail,
            redirect_url,
        }) => {
            assert_eq!(detail, "Please verify your email before logging in.");
            assert_eq!(redirect_url.as_deref(), Some("/verify-email.html"));
        }
        other => panic!("expected NotVerified, got {:?}", other),
    }
    assert!(repo.is_empty());
}

#[tokio::test]
async fn wrong_credentials_do_not_trigger_refresh() {
    //* Given
    let mut server = Server::new_async().await;
    let repo = Arc::new(MemoryRepository::new());

    let _token = server
        .mock("POST", "/api/token/")
        .with_status(401)
        .with_body(r#"{"detail":"No active account found with the given credentials"}"#)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .expect(0)
        .create_async()
        .await;

    //* When
    let client = client_for(&server, &repo);
    let result = auth::login(&client, "ira@example.com", "wrong").await;

    //* Then
    refresh.assert_async().await;
    match result {
        Err(LoginError::Rejected { status, detail }) => {
            assert_eq!(status, 401);
            assert_eq!(detail, "No active account found with the given credentials");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn identity_failure_clears_partial_session() {
    //* Given
    let mut server = Server::new_async().await;
    let repo = Arc::new(MemoryRepository::new());

    let _token = server
        .mock("POST", "/api/token/")
        .with_status(200)
        .with_body(r#"{"access":"a1","refresh":"r1"}"#)
        .create_async()
        .await;
    let _me = server
        .mock("GET", "/api/me/")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    //* When
    let client = client_for(&server, &repo);
    let result = auth::login(&client, "ira@example.com", "hunter22").await;

    //* Then
    assert!(matches!(result, Err(LoginError::Api(_))));
    assert!(repo.is_empty());
}

#[tokio::test]
async fn logout_clears_everything_and_points_at_login() {
    //* Given
    let server = Server::new_async().await;
    let repo = Arc::new(MemoryRepository::new());
    let client = client_for(&server, &repo);
    client
        .store()
        .set_session(SessionUpdate::access("a1").with_refresh("r1"))
        .unwrap();

    //* When
    let redirect = auth::logout(&client).unwrap();

    //* Then
    assert_eq!(redirect.target(), "login.html");
    assert!(repo.is_empty());
    // Logging out twice is fine.
    assert!(auth::logout(&client).is_ok());
}

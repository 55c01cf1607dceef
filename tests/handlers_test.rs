//! End-to-end tests that drive the full router: session layer, CSRF guard,
//! authentication guard and handlers, backed by an in-memory database.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use regex::Regex;
use snippetbox::{app_state::AppState, auth, build_app, config::AppConfig, snippets};
use time::OffsetDateTime;
use tower::ServiceExt;

const SEED_USER_NAME: &str = "Alice";
const SEED_USER_EMAIL: &str = "alice@example.com";
const SEED_USER_PASSWORD: &str = "pa$$word123";

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl TestResponse {
    fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }
}

/// Drives the router like a browser would, carrying the session cookie between requests.
struct TestClient {
    app: Router,
    state: AppState,
    cookie: Option<String>,
}

impl TestClient {
    async fn new() -> Self {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;

        let (state, app) = build_app(config).await.expect("app should build");
        let app = app.layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        snippets::insert_snippet(
            state.db(),
            "O snail",
            "An old silent pond...\nA frog jumps into the pond,\nsplash! Silence again.",
            365,
        )
        .await
        .expect("seed snippet");

        auth::register_user(
            state.db(),
            SEED_USER_NAME,
            SEED_USER_EMAIL,
            SEED_USER_PASSWORD,
            None,
        )
        .await
        .expect("seed user");

        Self {
            app,
            state,
            cookie: None,
        }
    }

    async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        for value in response.headers().get_all(header::SET_COOKIE) {
            if let Some(pair) = value.to_str().ok().and_then(|raw| raw.split(';').next()) {
                self.cookie = Some(pair.trim().to_string());
            }
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    async fn get(&mut self, path: &str) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(path);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = serde_urlencoded::to_string(fields).expect("encode form");
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).expect("request"))
            .await
    }

    /// Fetch a page and pull the CSRF token out of its form.
    async fn csrf_token_from(&mut self, path: &str) -> String {
        let page = self.get(path).await;
        assert_eq!(page.status, StatusCode::OK, "GET {path}");
        extract_csrf_token(&page.body)
    }

    async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        let token = self.csrf_token_from("/user/login").await;
        self.post_form(
            "/user/login",
            &[
                ("email", email),
                ("password", password),
                ("csrf_token", &token),
            ],
        )
        .await
    }
}

fn extract_csrf_token(body: &str) -> String {
    let rx = Regex::new(r#"name="csrf_token" value="(.+?)""#).expect("valid regex");
    rx.captures(body)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
        .expect("page should embed a CSRF token")
}

#[tokio::test]
async fn ping_answers_ok() {
    let mut client = TestClient::new().await;

    let response = client.get("/ping").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "OK");
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let mut client = TestClient::new().await;

    let response = client.get("/ping").await;

    assert_eq!(response.headers[header::X_FRAME_OPTIONS], "deny");
    assert_eq!(response.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(
        response.headers[header::REFERRER_POLICY],
        "origin-when-cross-origin"
    );
    assert!(response.headers.contains_key(header::CONTENT_SECURITY_POLICY));
}

#[tokio::test]
async fn snippet_view() {
    let mut client = TestClient::new().await;

    let cases = [
        ("Valid ID", "/snippet/view/1", StatusCode::OK, Some("An old silent pond...")),
        ("Non-existent ID", "/snippet/view/2", StatusCode::NOT_FOUND, None),
        ("Negative ID", "/snippet/view/-1", StatusCode::NOT_FOUND, None),
        ("Decimal ID", "/snippet/view/1.23", StatusCode::NOT_FOUND, None),
        ("String ID", "/snippet/view/foo", StatusCode::NOT_FOUND, None),
        ("Empty ID", "/snippet/view/", StatusCode::NOT_FOUND, None),
        ("Leading zero", "/snippet/view/01", StatusCode::NOT_FOUND, None),
    ];

    for (name, path, status, body) in cases {
        let response = client.get(path).await;
        assert_eq!(response.status, status, "{name}");
        if let Some(body) = body {
            assert!(response.body.contains(body), "{name}: body should contain {body:?}");
        }
    }
}

#[tokio::test]
async fn expired_snippets_are_not_found() {
    let mut client = TestClient::new().await;
    let now = OffsetDateTime::now_utc().unix_timestamp();

    let id = sqlx::query(
        "INSERT INTO snippets (title, content, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind("Old news")
    .bind("Gone by now")
    .bind(now - 86_400 * 2)
    .bind(now - 86_400)
    .execute(client.state.db())
    .await
    .expect("insert expired snippet")
    .last_insert_rowid();

    let response = client.get(&format!("/snippet/view/{id}")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let home = client.get("/").await;
    assert_eq!(home.status, StatusCode::OK);
    assert!(home.body.contains("O snail"));
    assert!(!home.body.contains("Old news"));
}

#[tokio::test]
async fn unknown_routes_render_not_found_page() {
    let mut client = TestClient::new().await;

    let response = client.get("/no/such/page").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.contains("Not Found"));
}

#[tokio::test]
async fn user_signup() {
    let mut client = TestClient::new().await;
    auth::register_user(
        client.state.db(),
        "Dupe",
        "dupe@example.com",
        "validPa$$word",
        None,
    )
    .await
    .expect("seed duplicate user");

    let valid_csrf_token = client.csrf_token_from("/user/signup").await;
    let form_tag = r#"<form action="/user/signup" method="POST" novalidate>"#;

    let cases = [
        ("Valid submission", "Bob", "bob@example.com", "validPa$$word", valid_csrf_token.as_str(), StatusCode::SEE_OTHER),
        ("Invalid CSRF Token", "Bob", "bob@example.com", "validPa$$word", "wrongToken", StatusCode::BAD_REQUEST),
        ("Invalid CSRF Token, empty fields", "", "", "", "wrongToken", StatusCode::BAD_REQUEST),
        ("Invalid CSRF Token, invalid fields", "Bob", "bob@example.", "pa$$", "wrongToken", StatusCode::BAD_REQUEST),
        ("Empty CSRF Token, duplicate email", "Bob", "dupe@example.com", "validPa$$word", "", StatusCode::BAD_REQUEST),
        ("Empty name", "", "bob@example.com", "validPa$$word", valid_csrf_token.as_str(), StatusCode::UNPROCESSABLE_ENTITY),
        ("Empty email", "Bob", "", "validPa$$word", valid_csrf_token.as_str(), StatusCode::UNPROCESSABLE_ENTITY),
        ("Empty password", "Bob", "bob@example.com", "", valid_csrf_token.as_str(), StatusCode::UNPROCESSABLE_ENTITY),
        ("Invalid email", "Bob", "bob@example.", "validPa$$word", valid_csrf_token.as_str(), StatusCode::UNPROCESSABLE_ENTITY),
        ("Short password", "Bob", "bob@example.com", "pa$$", valid_csrf_token.as_str(), StatusCode::UNPROCESSABLE_ENTITY),
        ("Duplicate email", "Bob", "dupe@example.com", "validPa$$word", valid_csrf_token.as_str(), StatusCode::UNPROCESSABLE_ENTITY),
    ];

    for (name, user_name, email, password, csrf_token, status) in cases {
        let response = client
            .post_form(
                "/user/signup",
                &[
                    ("name", user_name),
                    ("email", email),
                    ("password", password),
                    ("csrf_token", csrf_token),
                ],
            )
            .await;

        assert_eq!(response.status, status, "{name}");
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            assert!(response.body.contains(form_tag), "{name}: form should be re-rendered");
        }
        if status == StatusCode::SEE_OTHER {
            assert_eq!(response.location(), Some("/user/login"), "{name}");
        }
    }
}

#[tokio::test]
async fn signup_errors_keep_entered_values_but_not_password() {
    let mut client = TestClient::new().await;
    let token = client.csrf_token_from("/user/signup").await;

    let response = client
        .post_form(
            "/user/signup",
            &[
                ("name", "Bob"),
                ("email", SEED_USER_EMAIL),
                ("password", "sup3rSecretPass"),
                ("csrf_token", &token),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Email address is already in use"));
    assert!(response.body.contains(r#"value="Bob""#));
    assert!(!response.body.contains("sup3rSecretPass"));
}

#[tokio::test]
async fn signup_then_login_shows_flash() {
    let mut client = TestClient::new().await;
    let token = client.csrf_token_from("/user/signup").await;

    let response = client
        .post_form(
            "/user/signup",
            &[
                ("name", "Bob"),
                ("email", "bob@example.com"),
                ("password", "validPa$$word"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let login_page = client.get("/user/login").await;
    assert!(login_page
        .body
        .contains("Your signup was successful. Please log in."));

    let again = client.get("/user/login").await;
    assert!(!again.body.contains("Your signup was successful"));

    let response = client.login("bob@example.com", "validPa$$word").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn login_with_bad_credentials_fails_uniformly() {
    let mut client = TestClient::new().await;

    let wrong_password = client.login(SEED_USER_EMAIL, "not-the-password").await;
    let unknown_email = client.login("nobody@example.com", SEED_USER_PASSWORD).await;

    for response in [&wrong_password, &unknown_email] {
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.body.contains("Email or password is incorrect"));
    }
}

#[tokio::test]
async fn login_is_rate_limited_per_client() {
    let mut client = TestClient::new().await;
    let token = client.csrf_token_from("/user/login").await;

    let mut last = None;
    for _ in 0..6 {
        let response = client
            .post_form(
                "/user/login",
                &[("email", ""), ("password", ""), ("csrf_token", &token)],
            )
            .await;
        last = Some(response);
    }

    let last = last.expect("at least one attempt");
    assert_eq!(last.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(last.headers.contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn snippet_create() {
    let mut client = TestClient::new().await;

    // Unauthenticated
    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));

    // Authenticated
    let response = client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response
        .body
        .contains(r#"<form action="/snippet/create" method="POST">"#));
    assert_eq!(response.headers[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn unauthenticated_snippet_post_never_creates() {
    let mut client = TestClient::new().await;
    let token = client.csrf_token_from("/user/signup").await;

    let response = client
        .post_form(
            "/snippet/create",
            &[
                ("title", "Sneaky"),
                ("content", "Should not be stored"),
                ("expires", "7"),
                ("csrf_token", &token),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snippets")
        .fetch_one(client.state.db())
        .await
        .expect("count snippets");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn authenticated_user_creates_snippet() {
    let mut client = TestClient::new().await;
    client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;

    let token = client.csrf_token_from("/snippet/create").await;

    let invalid = client
        .post_form(
            "/snippet/create",
            &[
                ("title", ""),
                ("content", "Climb Mount Fuji"),
                ("expires", "30"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(invalid.body.contains("This field cannot be blank"));
    assert!(invalid.body.contains("This field must equal 1, 7 or 365"));
    assert!(invalid.body.contains("Climb Mount Fuji"));

    let created = client
        .post_form(
            "/snippet/create",
            &[
                ("title", "Fuji"),
                ("content", "Climb Mount Fuji, but slowly, slowly!"),
                ("expires", "7"),
                ("csrf_token", &token),
            ],
        )
        .await;
    assert_eq!(created.status, StatusCode::SEE_OTHER);
    let location = created.location().expect("redirect target").to_string();
    assert!(location.starts_with("/snippet/view/"));

    let view = client.get(&location).await;
    assert_eq!(view.status, StatusCode::OK);
    assert!(view.body.contains("Snippet successfully created!"));
    assert!(view.body.contains("Climb Mount Fuji, but slowly, slowly!"));
}

#[tokio::test]
async fn login_returns_to_the_originally_requested_page() {
    let mut client = TestClient::new().await;

    let response = client.get("/snippet/create?draft=1").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let response = client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/snippet/create?draft=1"));
}

#[tokio::test]
async fn login_rotates_csrf_token() {
    let mut client = TestClient::new().await;
    let before = client.csrf_token_from("/user/login").await;

    let response = client
        .post_form(
            "/user/login",
            &[
                ("email", SEED_USER_EMAIL),
                ("password", SEED_USER_PASSWORD),
                ("csrf_token", &before),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let stale = client
        .post_form(
            "/snippet/create",
            &[
                ("title", "Fuji"),
                ("content", "content"),
                ("expires", "7"),
                ("csrf_token", &before),
            ],
        )
        .await;
    assert_eq!(stale.status, StatusCode::BAD_REQUEST);

    let after = client.csrf_token_from("/snippet/create").await;
    assert_ne!(before, after);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let mut client = TestClient::new().await;
    client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;

    let token = client.csrf_token_from("/").await;
    let response = client
        .post_form("/user/logout", &[("csrf_token", &token)])
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));

    let home = client.get("/").await;
    assert!(home.body.contains("logged out successfully"));

    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));

    // The CSRF token outlives the logout.
    assert_eq!(client.csrf_token_from("/user/login").await, token);
}

#[tokio::test]
async fn csrf_guard_runs_before_every_form_handler() {
    let mut client = TestClient::new().await;
    client.csrf_token_from("/user/signup").await;

    let missing_field = client
        .post_form(
            "/user/signup",
            &[("name", ""), ("email", "bob@example."), ("password", "")],
        )
        .await;
    assert_eq!(missing_field.status, StatusCode::BAD_REQUEST);
    assert!(!missing_field.body.contains("<form"));

    let login = client
        .post_form(
            "/user/login",
            &[
                ("email", SEED_USER_EMAIL),
                ("password", SEED_USER_PASSWORD),
                ("csrf_token", "wrongToken"),
            ],
        )
        .await;
    assert_eq!(login.status, StatusCode::BAD_REQUEST);

    // Still anonymous: the forged login never reached the handler.
    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let response = client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let logout = client
        .post_form("/user/logout", &[("csrf_token", "wrongToken")])
        .await;
    assert_eq!(logout.status, StatusCode::BAD_REQUEST);

    let logout = client.post_form("/user/logout", &[]).await;
    assert_eq!(logout.status, StatusCode::BAD_REQUEST);

    // Still signed in after both rejected logouts.
    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn long_snippet_content_is_a_field_error() {
    let mut client = TestClient::new().await;
    client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;
    let token = client.csrf_token_from("/snippet/create").await;

    let content = "a".repeat(70_000);
    let response = client
        .post_form(
            "/snippet/create",
            &[
                ("title", "Too long"),
                ("content", &content),
                ("expires", "7"),
                ("csrf_token", &token),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response
        .body
        .contains("This field cannot be more than 65535 characters long"));
}

#[tokio::test]
async fn oversized_form_body_is_rejected_as_too_large() {
    let mut client = TestClient::new().await;
    client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;
    let token = client.csrf_token_from("/snippet/create").await;

    let content = "a".repeat(3 * 1024 * 1024);
    let response = client
        .post_form(
            "/snippet/create",
            &[
                ("title", "Huge"),
                ("content", &content),
                ("expires", "7"),
                ("csrf_token", &token),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn logged_out_cookie_cannot_be_replayed() {
    let mut client = TestClient::new().await;
    client.login(SEED_USER_EMAIL, SEED_USER_PASSWORD).await;
    let signed_in_cookie = client.cookie.clone();

    let token = client.csrf_token_from("/snippet/create").await;
    let response = client
        .post_form("/user/logout", &[("csrf_token", &token)])
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);

    let logins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logins")
        .fetch_one(client.state.db())
        .await
        .expect("count logins");
    assert_eq!(logins, 0);

    client.cookie = signed_in_cookie;
    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
}

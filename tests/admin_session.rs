mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;
use tower::ServiceExt;

use common::{ADMIN_PASSWORD, app, body_json, get, post_json, presets};

fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-real-ip", "10.1.1.1")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn console_requires_a_session() {
    let (app, _) = app(presets(5, 20, 100));

    let response = app.oneshot(get("/api/admin/me", "10.1.1.1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_session_cookie_is_rejected() {
    let (app, _) = app(presets(5, 20, 100));

    let response = app
        .oneshot(get_with_cookie(
            "/api/admin/me",
            "admin_session=eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJhZG1pbiJ9.bogus",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (app, _) = app(presets(5, 20, 100));

    let response = app
        .oneshot(post_json(
            "/api/admin/login",
            "10.1.1.1",
            json!({ "username": "admin", "password": "guess" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn login_sets_cookie_that_opens_console() {
    let (app, _) = app(presets(5, 20, 100));

    let login = app
        .clone()
        .oneshot(post_json(
            "/api/admin/login",
            "10.1.1.1",
            json!({ "username": "admin", "password": ADMIN_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);

    let set_cookie = login.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("admin_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
    let cookie = set_cookie.split(';').next().unwrap();

    let me = app
        .oneshot(get_with_cookie("/api/admin/me", cookie))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);
    let body = body_json(me).await;
    assert_eq!(body["resp_data"]["username"], "admin");
}

#[tokio::test]
async fn login_is_on_the_strict_budget() {
    let (app, _) = app(presets(2, 20, 100));
    let attempt = || {
        post_json(
            "/api/admin/login",
            "10.9.9.9",
            json!({ "username": "admin", "password": "guess" }),
        )
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(attempt()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.clone().oneshot(attempt()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn logout_expires_cookie() {
    let (app, _) = app(presets(5, 20, 100));

    let response = app
        .oneshot(post_json("/api/admin/logout", "10.1.1.1", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=0"));
}

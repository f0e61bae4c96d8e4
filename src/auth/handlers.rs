//! Authentication handlers for login and logout.

use askama::Template;
use axum::{
    extract::{rejection::FormRejection, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::CookieJar;

use super::error::{AuthError, LoginError};
use super::middleware::CurrentSession;
use super::password;
use super::session::Session;
use crate::state::AppState;
use crate::validation::{self, LoginValues, ValidationError};

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub version: &'static str,
}

fn render_login(error: Option<String>) -> Html<String> {
    let template = LoginTemplate {
        error,
        version: env!("CARGO_PKG_VERSION"),
    };
    Html(template.render().unwrap_or_default())
}

/// GET /login - Show login page, or go home when already signed in
pub async fn login_page(CurrentSession(current): CurrentSession) -> Response {
    if current.is_some() {
        return Redirect::to("/").into_response();
    }
    render_login(None).into_response()
}

/// POST /login - Process login
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    form: Result<Form<LoginValues>, FormRejection>,
) -> Response {
    let outcome = match form {
        Ok(Form(values)) => login(&state, values),
        Err(rejection) => {
            tracing::debug!("Rejected login form: {}", rejection);
            Err(ValidationError::Malformed.into())
        }
    };

    match outcome {
        Ok(session) => {
            let cookie = state.sessions.create_session_cookie(&session.id);
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Err(err) => {
            if let LoginError::Internal(e) = &err {
                tracing::error!("Login failed unexpectedly: {}", e);
            }
            let payload = err.to_action_error();
            (err.status(), render_login(Some(payload.error))).into_response()
        }
    }
}

/// Check credentials and open a session.
///
/// Unknown users, users without a password and wrong passwords all produce
/// [`LoginError::InvalidCredentials`].
pub fn login(state: &AppState, values: LoginValues) -> Result<Session, LoginError> {
    let credentials = validation::parse_login(values)?;

    let user = state.users.find_user_by_username(&credentials.username)?;
    let Some((user, hash)) = user.and_then(|u| {
        let hash = u.password_hash.clone()?;
        Some((u, hash))
    }) else {
        tracing::debug!("Login rejected: no password login for {}", credentials.username);
        return Err(LoginError::InvalidCredentials);
    };

    if !password::verify_password(&credentials.password, &hash)? {
        tracing::debug!("Login rejected: wrong password for {}", user.username);
        return Err(LoginError::InvalidCredentials);
    }

    let session = state.sessions.create_session(&user.id)?;
    tracing::info!("User {} logged in", user.username);
    Ok(session)
}

/// POST /logout - Invalidate the current session and clear the cookie
pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(current): CurrentSession,
    jar: CookieJar,
) -> Result<Response, AuthError> {
    let valid = current.ok_or(AuthError::Unauthorized)?;

    state.sessions.invalidate_session(&valid.session.id)?;
    tracing::info!("User {} logged out", valid.user.username);

    let blank = state.sessions.create_blank_session_cookie();
    Ok((jar.add(blank), Redirect::to("/login")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{SessionExpiry, SESSION_COOKIE_NAME};
    use crate::router::router;
    use crate::testing::TestEnv;
    use axum::http::{header::SET_COOKIE, StatusCode};
    use axum_extra::extract::cookie::Cookie;
    use axum_test::TestServer;
    use chrono::{Duration, Utc};

    fn values(username: &str, password: &str) -> LoginValues {
        LoginValues {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn server(env: &TestEnv) -> TestServer {
        TestServer::new(router(env.state.clone())).unwrap()
    }

    fn session_cookie(id: &str) -> Cookie<'static> {
        Cookie::new(SESSION_COOKIE_NAME, id.to_string())
    }

    // ==================== login() ====================

    #[test]
    fn test_login_any_casing_resolves_same_user() {
        let env = TestEnv::new();
        let alice = env.add_user("Alice", Some("pw"));

        for name in ["Alice", "alice", "ALICE"] {
            let session = login(&env.state, values(name, "pw")).unwrap();
            assert_eq!(session.user_id, alice.id);
        }
        assert_eq!(env.user_session_ids(&alice.id).len(), 3);
    }

    #[test]
    fn test_login_unknown_user_and_wrong_password_match() {
        let env = TestEnv::new();
        env.add_user("bob", Some("correct"));

        let unknown = login(&env.state, values("nobody", "correct")).unwrap_err();
        let wrong = login(&env.state, values("bob", "wrong")).unwrap_err();

        assert_eq!(unknown.to_action_error(), wrong.to_action_error());
        assert_eq!(unknown.status(), wrong.status());
        assert_eq!(env.session_count(), 0);
    }

    #[test]
    fn test_login_without_password_hash_always_fails() {
        let env = TestEnv::new();
        env.add_user("googler", None);

        for attempt in ["x", "anything at all", "hunter2"] {
            let err = login(&env.state, values("googler", attempt)).unwrap_err();
            assert!(matches!(err, LoginError::InvalidCredentials), "{attempt}");
        }
        let err = login(&env.state, values("googler", "")).unwrap_err();
        assert!(matches!(err, LoginError::Validation(_)));
        assert_eq!(env.session_count(), 0);
    }

    #[test]
    fn test_login_adds_exactly_one_session() {
        let env = TestEnv::new();
        let user = env.add_user("carl", Some("pw"));
        let before = env.user_session_ids(&user.id);

        let session = login(&env.state, values("carl", "pw")).unwrap();

        let after = env.user_session_ids(&user.id);
        assert_eq!(after.len(), before.len() + 1);
        assert!(after.contains(&session.id));
        assert!(session.fresh);
    }

    #[test]
    fn test_login_validation_runs_before_storage() {
        let env = TestEnv::new();
        let err = login(&env.state, values(" ", "pw")).unwrap_err();
        assert!(matches!(
            err,
            LoginError::Validation(ValidationError::Required("Username"))
        ));
        // The lazily-opened database was never touched
        assert!(!env.state.storage.is_open());
    }

    #[test]
    fn test_login_corrupt_hash_is_generic_failure() {
        let env = TestEnv::new();
        env.state
            .users
            .create_user(crate::auth::NewUser {
                username: "broken".into(),
                display_name: "Broken".into(),
                password_hash: Some("garbage".into()),
                ..Default::default()
            })
            .unwrap();

        let err = login(&env.state, values("broken", "pw")).unwrap_err();
        assert!(matches!(err, LoginError::Internal(_)));
        assert_eq!(
            err.to_action_error().error,
            "Something went wrong. Please try again."
        );
    }

    // ==================== HTTP ====================

    #[tokio::test]
    async fn test_wrong_password_scenario() {
        let env = TestEnv::new();
        env.add_user("bob", Some("correct"));
        let server = server(&env);

        let response = server
            .post("/login")
            .form(&[("username", "bob"), ("password", "wrong")])
            .await;

        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert!(response.text().contains("Incorrect username or password"));
        assert!(response.maybe_cookie(SESSION_COOKIE_NAME).is_none());
        assert_eq!(env.session_count(), 0);
    }

    #[tokio::test]
    async fn test_uppercase_username_scenario() {
        let env = TestEnv::new();
        let bob = env.add_user("bob", Some("correct"));
        let server = server(&env);

        let response = server
            .post("/login")
            .form(&[("username", "BOB"), ("password", "correct")])
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/");

        let cookie = response.cookie(SESSION_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(env.user_session_ids(&bob.id), vec![cookie.value().to_string()]);
    }

    #[tokio::test]
    async fn test_failure_bodies_are_byte_identical() {
        let env = TestEnv::new();
        env.add_user("bob", Some("correct"));
        let server = server(&env);

        let unknown = server
            .post("/login")
            .form(&[("username", "ghost"), ("password", "correct")])
            .await;
        let wrong = server
            .post("/login")
            .form(&[("username", "bob"), ("password", "nope")])
            .await;

        assert_eq!(unknown.status_code(), wrong.status_code());
        assert_eq!(unknown.as_bytes(), wrong.as_bytes());
    }

    #[tokio::test]
    async fn test_malformed_form_is_validation_error() {
        let env = TestEnv::new();
        let server = server(&env);

        let response = server.post("/login").form(&[("username", "bob")]).await;

        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.text().contains("Invalid login form"));
        assert!(!env.state.storage.is_open());
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let env = TestEnv::new();
        let user = env.add_user("dana", Some("pw"));
        let session = env.state.sessions.create_session(&user.id).unwrap();
        let server = server(&env);

        let response = server
            .post("/logout")
            .add_cookie(session_cookie(&session.id))
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/login");
        assert_eq!(response.cookie(SESSION_COOKIE_NAME).value(), "");
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 1);
        assert!(env.state.sessions.validate_session(&session.id).unwrap().is_none());

        // The old id is never accepted again
        let again = server
            .post("/logout")
            .add_cookie(session_cookie(&session.id))
            .await;
        assert_eq!(again.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_without_session_mutates_nothing() {
        let env = TestEnv::new();
        let user = env.add_user("eve", Some("pw"));
        env.state.sessions.create_session(&user.id).unwrap();
        let server = server(&env);

        let response = server.post("/logout").await;

        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert!(response.maybe_cookie(SESSION_COOKIE_NAME).is_none());
        assert_eq!(env.session_count(), 1);
    }

    #[tokio::test]
    async fn test_logout_with_stale_cookie_clears_it() {
        let env = TestEnv::new();
        let user = env.add_user("finn", Some("pw"));
        env.state.sessions.create_session(&user.id).unwrap();
        let server = server(&env);

        let response = server
            .post("/logout")
            .add_cookie(session_cookie("stale"))
            .await;

        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.cookie(SESSION_COOKIE_NAME).value(), "");
        assert_eq!(env.session_count(), 1);
    }

    #[tokio::test]
    async fn test_login_then_home_then_logout() {
        let env = TestEnv::new();
        env.add_user("gwen", Some("pw"));
        let server = server(&env);

        let login = server
            .post("/login")
            .form(&[("username", "gwen"), ("password", "pw")])
            .await;
        let cookie = login.cookie(SESSION_COOKIE_NAME);

        let home = server.get("/").add_cookie(cookie.clone()).await;
        assert_eq!(home.status_code(), StatusCode::OK);
        assert!(home.text().contains("gwen"));

        let logout = server.post("/logout").add_cookie(cookie.clone()).await;
        assert_eq!(logout.status_code(), StatusCode::SEE_OTHER);

        let home = server.get("/").add_cookie(cookie).await;
        assert_eq!(home.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(home.header("location"), "/login");
        assert_eq!(home.cookie(SESSION_COOKIE_NAME).value(), "");
    }

    #[tokio::test]
    async fn test_login_page_redirects_when_signed_in() {
        let env = TestEnv::new();
        let user = env.add_user("hugo", Some("pw"));
        let session = env.state.sessions.create_session(&user.id).unwrap();
        let server = server(&env);

        let anonymous = server.get("/login").await;
        assert_eq!(anonymous.status_code(), StatusCode::OK);
        assert!(anonymous.text().contains("<form"));

        let signed_in = server
            .get("/login")
            .add_cookie(session_cookie(&session.id))
            .await;
        assert_eq!(signed_in.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(signed_in.header("location"), "/");
    }

    #[tokio::test]
    async fn test_fresh_session_cookie_reissued_on_read() {
        let env = TestEnv::with_expiry(SessionExpiry::Sliding(Duration::days(30)));
        let user = env.add_user("iris", Some("pw"));
        let session_id = env.insert_session(&user.id, Some(Utc::now() + Duration::days(1)));
        let server = server(&env);

        let response = server
            .get("/")
            .add_cookie(session_cookie(&session_id))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 1);
        assert_eq!(response.cookie(SESSION_COOKIE_NAME).value(), session_id);
    }
}

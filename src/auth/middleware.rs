//! Request-scoped session resolution and extractors.
//!
//! [`session_scope`] wraps every route and places a [`SessionScope`] in the
//! request extensions. The first extractor that asks for the current session
//! validates the cookie against storage and stores the result in the scope;
//! later extractors in the same request reuse it. Cookie refreshes discovered
//! on this read path are queued on the scope and written to the response when
//! the handler returns, unless the handler set the session cookie itself.

use axum::{
    extract::{FromRequestParts, Request},
    http::{header::SET_COOKIE, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use super::error::AuthError;
use super::session::{SessionManager, ValidSession, SESSION_COOKIE_NAME};
use crate::state::AppState;

/// Per-request cache of the resolved session plus the cookie to send back.
#[derive(Clone, Default)]
pub struct SessionScope {
    inner: Arc<ScopeState>,
}

#[derive(Default)]
struct ScopeState {
    resolved: OnceCell<Option<ValidSession>>,
    outbound: Mutex<Option<Cookie<'static>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CookieWriteError {
    #[error("no response scope for this request")]
    NoScope,
    #[error("outbound cookie slot poisoned")]
    Poisoned,
}

impl SessionScope {
    /// Queue a cookie for the response. Replaces anything queued earlier.
    pub fn queue_cookie(&self, cookie: Cookie<'static>) -> Result<(), CookieWriteError> {
        let mut slot = self
            .inner
            .outbound
            .lock()
            .map_err(|_| CookieWriteError::Poisoned)?;
        *slot = Some(cookie);
        Ok(())
    }

    fn take_cookie(&self) -> Option<Cookie<'static>> {
        self.inner.outbound.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Middleware installing a [`SessionScope`] and flushing its queued cookie.
pub async fn session_scope(mut req: Request, next: Next) -> Response {
    let scope = SessionScope::default();
    req.extensions_mut().insert(scope.clone());

    let mut response = next.run(req).await;

    if let Some(cookie) = scope.take_cookie() {
        append_cookie(response.headers_mut(), &cookie);
    }
    response
}

/// Best-effort: the response still goes out if the header cannot be written.
fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'static>) {
    let prefix = format!("{}=", cookie.name());
    let handler_set_it = headers
        .get_all(SET_COOKIE)
        .iter()
        .any(|v| v.to_str().map(|s| s.starts_with(&prefix)).unwrap_or(false));
    if handler_set_it {
        tracing::debug!("Handler set {} itself; dropping refreshed cookie", cookie.name());
        return;
    }

    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(e) => tracing::debug!("Could not encode {} cookie: {}", cookie.name(), e),
    }
}

/// Resolve the session for this request, at most once per request.
///
/// Without a scope (the middleware is not installed) the lookup still works,
/// but cookie refreshes have nowhere to go and are dropped.
pub async fn validate_request(
    sessions: &SessionManager,
    headers: &HeaderMap,
    scope: Option<&SessionScope>,
) -> Result<Option<ValidSession>, AuthError> {
    let jar = CookieJar::from_headers(headers);
    match scope {
        Some(scope) => scope
            .inner
            .resolved
            .get_or_try_init(|| async { resolve(sessions, &jar, Some(scope)) })
            .await
            .cloned(),
        None => resolve(sessions, &jar, None),
    }
}

fn resolve(
    sessions: &SessionManager,
    jar: &CookieJar,
    scope: Option<&SessionScope>,
) -> Result<Option<ValidSession>, AuthError> {
    let Some(session_id) = jar
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value())
        .filter(|v| !v.is_empty())
    else {
        return Ok(None);
    };

    let result = sessions.validate_session(session_id)?;

    let refresh = match &result {
        Some(valid) if valid.session.fresh => Some(sessions.create_session_cookie(&valid.session.id)),
        Some(_) => None,
        None => Some(sessions.create_blank_session_cookie()),
    };

    if let Some(cookie) = refresh {
        let queued = scope
            .ok_or(CookieWriteError::NoScope)
            .and_then(|scope| scope.queue_cookie(cookie));
        if let Err(e) = queued {
            tracing::debug!("Session cookie refresh skipped: {}", e);
        }
    }

    Ok(result)
}

/// The current session, if any. Never rejects for a missing session.
pub struct CurrentSession(pub Option<ValidSession>);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let scope = parts.extensions.get::<SessionScope>().cloned();
        let resolved = validate_request(&state.sessions, &parts.headers, scope.as_ref()).await?;
        Ok(CurrentSession(resolved))
    }
}

/// Requires a signed-in user. Redirects to /login otherwise.
pub struct RequireUser(pub ValidSession);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentSession(current) = CurrentSession::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        current
            .map(RequireUser)
            .ok_or_else(|| Redirect::to("/login").into_response())
    }
}

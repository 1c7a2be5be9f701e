//! Caller identity, borrowed from the CMS.
//!
//! The dashboard keeps no accounts of its own. A request's `sessionid` cookie
//! is forwarded to the CMS admin page; if the CMS renders its signed-in
//! header, the name in it is the caller's identity. Every failure mode
//! (no cookie, non-200, transport error, marker missing) means anonymous.

use std::convert::Infallible;
use std::sync::OnceLock;

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use regex::Regex;
use tracing::debug;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "sessionid";

static USER_MARKER: OnceLock<Regex> = OnceLock::new();

fn user_marker() -> &'static Regex {
    USER_MARKER.get_or_init(|| {
        Regex::new(r#"<h2 class="w-label-1 w-mt-0 w-mb-1">([^<]*)</h2>"#).unwrap()
    })
}

/// Extract the signed-in name from a CMS admin page.
pub fn scrape_user(html: &str) -> Option<String> {
    let name = user_marker().captures(html)?.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Value of the `sessionid` cookie, if the request carries one.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|part| {
            part.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
}

/// Asks the CMS who owns a session.
#[derive(Clone)]
pub struct CmsProbe {
    client: reqwest::Client,
    admin_url: String,
}

impl CmsProbe {
    pub fn new(admin_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            admin_url: admin_url.into(),
        }
    }

    pub async fn identify(&self, session: &str) -> Option<String> {
        let resp = match self
            .client
            .get(&self.admin_url)
            .header(reqwest::header::COOKIE, format!("{SESSION_COOKIE}={session}"))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "cms probe failed");
                return None;
            }
        };
        if resp.status() != reqwest::StatusCode::OK {
            debug!(status = %resp.status(), "cms probe rejected session");
            return None;
        }
        let body = resp.text().await.ok()?;
        scrape_user(&body)
    }
}

/// The caller's display name, or `None` when anonymous.
///
/// Never rejects; routes decide what anonymous means for them.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser(pub Option<String>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(session) = session_cookie(&parts.headers) else {
            return Ok(CurrentUser(None));
        };
        Ok(CurrentUser(state.probe.identify(&session).await))
    }
}

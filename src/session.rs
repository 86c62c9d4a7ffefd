//! Login sessions.
//!
//! A session is a random token handed to the browser in the `club_session`
//! cookie. The token maps to a member id and an expiry time; nothing else is
//! stored on the client.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "club_session";

#[derive(Debug, Clone)]
struct Session {
    member_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cleanup_expired_sessions(&self, now: DateTime<Utc>) {
        self.sessions()
            .retain(|_, session| session.expires_at > now);
    }

    pub fn create(&self, member_id: Uuid) -> Uuid {
        let now = Utc::now();
        self.cleanup_expired_sessions(now);

        let token = Uuid::new_v4();
        self.sessions().insert(
            token,
            Session {
                member_id,
                expires_at: now + self.ttl,
            },
        );
        debug!(%member_id, "Session created");
        token
    }

    pub fn member_id(&self, token: Uuid) -> Option<Uuid> {
        let now = Utc::now();
        let mut sessions = self.sessions();
        match sessions.get(&token) {
            Some(session) if session.expires_at > now => Some(session.member_id),
            Some(_) => {
                sessions.remove(&token);
                None
            }
            None => None,
        }
    }

    pub fn destroy(&self, token: Uuid) {
        self.sessions().remove(&token);
    }

    pub fn destroy_for_member(&self, member_id: Uuid) {
        self.sessions()
            .retain(|_, session| session.member_id != member_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions().len()
    }
}

pub fn session_token(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

pub fn session_cookie(token: Uuid, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

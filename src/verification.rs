use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

/// Codes and access tokens share one time-to-live; a successful code exchange
/// refreshes `created_at`, restarting the window for the access token.
pub const SESSION_TTL_MINUTES: i64 = 10;
pub const MAX_ATTEMPTS: u32 = 5;

/// Sentinel stored in `code` once the client has proven ownership of the
/// email; distinguishes an access session from a pending one.
const VERIFIED: &str = "VERIFIED";

#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub code: String,
    pub email: String,
    pub empresa_id: String,
    pub cliente_id: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

impl VerificationSession {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Duration::minutes(SESSION_TTL_MINUTES)
    }

    fn verified(&self) -> bool {
        self.code == VERIFIED
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CodeError {
    UnknownToken,
    Expired,
    TooManyAttempts,
    /// Wrong code; the session survives with one attempt burned.
    WrongCode {
        remaining: u32,
    },
}

/// Process-scoped session store, created at service start and injected into
/// handlers. One lock covers the whole map: read-modify-write on a session is
/// serialized, which is what the attempt counter needs. Expired entries are
/// evicted lazily.
pub struct SessionStore {
    inner: Mutex<HashMap<String, VerificationSession>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Create a pending session for a known client. Returns the lookup token
    /// and the 6-digit code to be delivered out of band.
    pub fn issue(&self, email: &str, empresa_id: &str, cliente_id: &str) -> (String, String) {
        let token = Uuid::new_v4().to_string();
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let now = Utc::now();

        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, session| !session.expired(now));
        sessions.insert(
            token.clone(),
            VerificationSession {
                code: code.clone(),
                email: email.to_string(),
                empresa_id: empresa_id.to_string(),
                cliente_id: cliente_id.to_string(),
                created_at: now,
                attempts: 0,
            },
        );
        (token, code)
    }

    /// Exchange a pending token plus code for an access token. The pending
    /// session is consumed on success; expiry and attempt exhaustion delete
    /// it outright.
    pub fn validate_code(
        &self,
        token: &str,
        code: &str,
    ) -> Result<(String, VerificationSession), CodeError> {
        let now = Utc::now();
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let session = match sessions.get_mut(token) {
            Some(session) if !session.verified() => session,
            _ => return Err(CodeError::UnknownToken),
        };

        if session.expired(now) {
            sessions.remove(token);
            return Err(CodeError::Expired);
        }
        if session.attempts >= MAX_ATTEMPTS {
            sessions.remove(token);
            return Err(CodeError::TooManyAttempts);
        }
        if session.code != code.trim() {
            session.attempts += 1;
            let remaining = MAX_ATTEMPTS - session.attempts;
            return Err(CodeError::WrongCode { remaining });
        }

        let session = sessions
            .remove(token)
            .ok_or(CodeError::UnknownToken)?;

        // Longer token for the access session, fresh window.
        let access_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let access = VerificationSession {
            code: VERIFIED.to_string(),
            created_at: now,
            attempts: 0,
            ..session
        };
        sessions.insert(access_token.clone(), access.clone());
        Ok((access_token, access))
    }

    /// Resolve an access token to its session, or nothing if the token is
    /// unknown, still pending, or past its window. Required before any
    /// self-service action; callers must still match the session against the
    /// target appointment's owner.
    pub fn validate_access(&self, token: &str) -> Option<VerificationSession> {
        let now = Utc::now();
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get(token) {
            Some(session) if session.expired(now) => {
                sessions.remove(token);
                None
            }
            Some(session) if session.verified() => Some(session.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    fn backdate(&self, token: &str, minutes: i64) {
        let mut sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get_mut(token) {
            session.created_at -= Duration::minutes(minutes);
        }
    }

    #[cfg(test)]
    fn peek_code(&self, token: &str) -> Option<String> {
        let sessions = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(token).map(|s| s.code.clone())
    }
}

//! Cookie-backed browser sessions.
//!
//! The whole session lives in one signed cookie: a JSON payload with the
//! session values and an issue timestamp, base64url-encoded and followed by
//! an HMAC-SHA256 tag. Anything that fails verification or has outlived
//! [`MAX_AGE_SECS`] loads as an empty session.
//!
//! Values are read and written through typed [`SessionKey`]s. Mutations are
//! only persisted when the handler sends back [`SessionStore::cookie`].

use std::marker::PhantomData;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

use crate::config::{ConfigError, ServerConfig};

pub const SESSION_COOKIE: &str = "poddy";
pub const MAX_AGE_SECS: i64 = 24 * 60 * 60;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to decode session value '{key}': {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to encode session value '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("session cookie is not a valid header value")]
    InvalidHeader,
}

// ── Typed keys ───────────────────────────────────────────────

/// A session entry name bound to the type stored under it.
pub struct SessionKey<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SessionKey<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// ── Session ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Session {
    values: Map<String, Value>,
    modified: bool,
}

impl Session {
    pub fn get<T: DeserializeOwned>(&self, key: &SessionKey<T>) -> Result<Option<T>, SessionError> {
        match self.values.get(key.name()) {
            None => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(|source| SessionError::Decode {
                    key: key.name().to_string(),
                    source,
                }),
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &SessionKey<T>, value: &T) -> Result<(), SessionError> {
        let raw = serde_json::to_value(value).map_err(|source| SessionError::Encode {
            key: key.name().to_string(),
            source,
        })?;
        self.values.insert(key.name().to_string(), raw);
        self.modified = true;
        Ok(())
    }

    /// Remove a value. Removing a missing key is a no-op.
    pub fn remove<T>(&mut self, key: &SessionKey<T>) {
        if self.values.remove(key.name()).is_some() {
            self.modified = true;
        }
    }

    /// Read and remove a value in one step (single-use entries).
    pub fn take<T: DeserializeOwned>(&mut self, key: &SessionKey<T>) -> Result<Option<T>, SessionError> {
        let value = self.get(key);
        self.remove(key);
        value
    }

    pub fn contains<T>(&self, key: &SessionKey<T>) -> bool {
        self.values.contains_key(key.name())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

#[derive(Serialize, Deserialize)]
struct CookiePayload {
    iat: i64,
    values: Map<String, Value>,
}

// ── Store ────────────────────────────────────────────────────

/// Signs, verifies and renders the session cookie.
#[derive(Clone)]
pub struct SessionStore {
    key: Vec<u8>,
    domain: Option<String>,
    secure: bool,
}

impl SessionStore {
    pub fn new(key: Vec<u8>, domain: Option<String>, secure: bool) -> Self {
        Self { key, domain, secure }
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self, ConfigError> {
        let url = server.parsed_url()?;
        Ok(Self::new(
            server.cookie_key()?,
            url.host_str().map(String::from),
            server.secure_cookies,
        ))
    }

    /// Session carried by the request's `Cookie` header, or an empty one.
    pub fn load(&self, headers: &HeaderMap) -> Session {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, value)| self.decode(value))
            .unwrap_or_default()
    }

    pub fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let payload = serde_json::to_vec(&CookiePayload {
            iat: chrono::Utc::now().timestamp(),
            values: session.values.clone(),
        })?;
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let body = engine.encode(payload);
        let tag = engine.encode(self.mac(body.as_bytes()).finalize().into_bytes());
        Ok(format!("{}.{}", body, tag))
    }

    pub fn decode(&self, raw: &str) -> Option<Session> {
        let (body, tag) = raw.split_once('.')?;
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let tag = engine.decode(tag).ok()?;

        if self.mac(body.as_bytes()).verify_slice(&tag).is_err() {
            tracing::debug!("Discarding session cookie with invalid signature");
            return None;
        }

        let payload: CookiePayload = serde_json::from_slice(&engine.decode(body).ok()?).ok()?;
        if chrono::Utc::now().timestamp() - payload.iat > MAX_AGE_SECS {
            tracing::debug!("Discarding expired session cookie");
            return None;
        }

        Some(Session {
            values: payload.values,
            modified: false,
        })
    }

    /// `Set-Cookie` header persisting the session.
    pub fn cookie(&self, session: &Session) -> Result<(HeaderName, HeaderValue), SessionError> {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            self.encode(session)?,
            MAX_AGE_SECS
        );
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        let value = HeaderValue::from_str(&cookie).map_err(|_| SessionError::InvalidHeader)?;
        Ok((SET_COOKIE, value))
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(data);
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(b"test-secret".to_vec(), Some("poddy.local".into()), false)
    }

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_typed_get_set_remove() {
        let key: SessionKey<String> = SessionKey::new("gitlab_state");
        let mut session = Session::default();

        assert_eq!(session.get(&key).unwrap(), None);
        session.set(&key, &"nonce".to_string()).unwrap();
        assert_eq!(session.get(&key).unwrap().as_deref(), Some("nonce"));
        assert!(session.is_modified());

        session.remove(&key);
        assert!(!session.contains(&key));
    }

    #[test]
    fn test_remove_missing_key_is_noop() {
        let key: SessionKey<String> = SessionKey::new("missing");
        let mut session = Session::default();
        session.remove(&key);
        session.remove(&key);
        assert!(!session.is_modified());
    }

    #[test]
    fn test_take_is_single_use() {
        let key: SessionKey<String> = SessionKey::new("once");
        let mut session = Session::default();
        session.set(&key, &"v".to_string()).unwrap();

        assert_eq!(session.take(&key).unwrap().as_deref(), Some("v"));
        assert_eq!(session.take(&key).unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_decode_error() {
        let mut session = Session::default();
        session.set(&SessionKey::<u32>::new("n"), &7).unwrap();

        let err = session.get(&SessionKey::<Vec<String>>::new("n")).unwrap_err();
        assert!(matches!(err, SessionError::Decode { .. }));
    }

    #[test]
    fn test_cookie_roundtrip() {
        let store = store();
        let key: SessionKey<String> = SessionKey::new("k");
        let mut session = Session::default();
        session.set(&key, &"value".to_string()).unwrap();

        let encoded = store.encode(&session).unwrap();
        let headers = headers_with_cookie(&format!("other=1; {}={}", SESSION_COOKIE, encoded));
        let loaded = store.load(&headers);

        assert_eq!(loaded.get(&key).unwrap().as_deref(), Some("value"));
        assert!(!loaded.is_modified());
    }

    #[test]
    fn test_tampered_cookie_loads_empty() {
        let store = store();
        let key: SessionKey<String> = SessionKey::new("k");
        let mut session = Session::default();
        session.set(&key, &"value".to_string()).unwrap();

        let encoded = store.encode(&session).unwrap();
        let (_, tag) = encoded.split_once('.').unwrap();
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let forged_body = engine.encode(r#"{"iat":0,"values":{"k":"evil"}}"#);
        let forged = format!("{}.{}", forged_body, tag);

        assert!(store.decode(&forged).is_none());
        assert!(store.load(&headers_with_cookie(&format!("poddy={}", forged))).get(&key).unwrap().is_none());
    }

    #[test]
    fn test_cookie_signed_with_other_key_is_rejected() {
        let mut session = Session::default();
        session.set(&SessionKey::<bool>::new("x"), &true).unwrap();
        let encoded = SessionStore::new(b"other".to_vec(), None, false).encode(&session).unwrap();

        assert!(store().decode(&encoded).is_none());
    }

    #[test]
    fn test_expired_cookie_is_rejected() {
        let store = store();
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let body = engine.encode(r#"{"iat":1000,"values":{}}"#);
        let tag = engine.encode(store.mac(body.as_bytes()).finalize().into_bytes());

        assert!(store.decode(&format!("{}.{}", body, tag)).is_none());
    }

    #[test]
    fn test_set_cookie_attributes() {
        let store = SessionStore::new(b"k".to_vec(), Some("poddy.local".into()), true);
        let (name, value) = store.cookie(&Session::default()).unwrap();
        let value = value.to_str().unwrap();

        assert_eq!(name, SET_COOKIE);
        assert!(value.starts_with("poddy="));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=86400"));
        assert!(value.contains("Domain=poddy.local"));
        assert!(value.ends_with("; Secure"));
    }
}

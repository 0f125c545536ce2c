//! Identifier types shared by every crate in the workspace.
//!
//! - [`SessionId`] for the opaque episode identifier issued by the backend after Stage 1.
//! - [`IdempotencyKey`] for the final submission, derived from a [`SessionId`].

use std::fmt;
use std::str::FromStr;

/// Errors returned when parsing a [`SessionId`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("session id must be 'sess_' followed by 8 lowercase hex characters, got: '{0}'")]
    Malformed(String),
}

/// Opaque episode identifier issued by the backend once Stage 1 is accepted.
///
/// Canonical form is `sess_` followed by 8 lowercase hex characters, e.g. `sess_09d894d5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    const PREFIX: &'static str = "sess_";
    const HEX_LEN: usize = 8;

    /// Allocates a fresh session id from a random v4 UUID.
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, &simple[..Self::HEX_LEN]))
    }

    /// Validates an externally supplied session id. Non-canonical input is rejected, not
    /// normalised.
    pub fn parse(input: &str) -> Result<Self, SessionIdError> {
        if Self::is_canonical(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(SessionIdError::Malformed(input.to_owned()))
    }

    /// Returns true if `input` is in canonical session id form.
    pub fn is_canonical(input: &str) -> bool {
        input
            .strip_prefix(Self::PREFIX)
            .is_some_and(|hex| {
                hex.len() == Self::HEX_LEN
                    && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionId::parse(s)
    }
}

impl serde::Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SessionId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Key the backend uses to deduplicate final submissions.
///
/// Always derived from a [`SessionId`], so every retry for one episode carries the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_session(session: &SessionId) -> Self {
        Self(format!("finalize:{}", session))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

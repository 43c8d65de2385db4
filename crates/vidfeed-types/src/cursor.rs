//! Opaque page tokens.
//!
//! A cursor is the sort key of the last row a caller has seen, serialized to
//! JSON and wrapped in URL-safe base64. Tokens come back from clients, so
//! decoding re-validates the shape and refuses keys that belong to a
//! different sort policy.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Longest token we bother decoding. Real tokens are well under 100 bytes.
const MAX_TOKEN_LEN: usize = 256;

/// Ordering applied to a listing. Both policies sort descending and break ties
/// on descending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortPolicy {
    /// `updatedAt` desc
    Recency,
    /// `viewCount` desc
    Popularity,
}

impl fmt::Display for SortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recency => f.write_str("recency"),
            Self::Popularity => f.write_str("popularity"),
        }
    }
}

/// Composite keyset position: primary sort value plus the id tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "p", rename_all = "lowercase")]
pub enum SortKey {
    Recency {
        #[serde(rename = "t", with = "chrono::serde::ts_microseconds")]
        updated_at: DateTime<Utc>,
        id: Uuid,
    },
    Popularity {
        #[serde(rename = "v")]
        view_count: i64,
        id: Uuid,
    },
}

impl SortKey {
    pub fn policy(&self) -> SortPolicy {
        match self {
            Self::Recency { .. } => SortPolicy::Recency,
            Self::Popularity { .. } => SortPolicy::Popularity,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Recency { id, .. } | Self::Popularity { id, .. } => *id,
        }
    }

    /// Same JSON the `Deserialize` impl reads back.
    pub fn encode(&self) -> String {
        let json = match self {
            Self::Recency { updated_at, id } => json!({
                "p": "recency",
                "t": updated_at.timestamp_micros(),
                "id": id.to_string(),
            }),
            Self::Popularity { view_count, id } => json!({
                "p": "popularity",
                "v": view_count,
                "id": id.to_string(),
            }),
        };
        B64.encode(json.to_string())
    }

    /// Parse an untrusted token, insisting it was issued for `expected`.
    pub fn decode(token: &str, expected: SortPolicy) -> Result<Self, CursorError> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(CursorError::Malformed);
        }

        let bytes = B64.decode(token).map_err(|_| CursorError::Malformed)?;
        let key: SortKey = serde_json::from_slice(&bytes).map_err(|_| CursorError::Malformed)?;

        if key.policy() != expected {
            return Err(CursorError::PolicyMismatch {
                expected,
                found: key.policy(),
            });
        }

        if let Self::Popularity { view_count, .. } = key {
            if view_count < 0 {
                return Err(CursorError::OutOfRange);
            }
        }

        Ok(key)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor is malformed")]
    Malformed,
    #[error("cursor was issued for {found} ordering, expected {expected}")]
    PolicyMismatch {
        expected: SortPolicy,
        found: SortPolicy,
    },
    #[error("cursor value is out of range")]
    OutOfRange,
}

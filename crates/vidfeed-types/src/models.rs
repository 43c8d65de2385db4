use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Controls which feeds an item can appear in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "private" => Ok(Self::Private),
            other => Err(ParseEnumError::new("visibility", other)),
        }
    }
}

/// Lifecycle of the externally hosted asset as reported by the media provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Waiting,
    Preparing,
    Ready,
    Errored,
    Deleted,
}

impl AssetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Errored => "errored",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for AssetStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "errored" => Ok(Self::Errored),
            "deleted" => Ok(Self::Deleted),
            other => Err(ParseEnumError::new("asset status", other)),
        }
    }
}

// -- Reactions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Dislike,
}

impl ReactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            other => Err(ParseEnumError::new("reaction type", other)),
        }
    }
}

/// Entity kinds a reaction can point at. Target ids are globally unique, so
/// one user holds at most one reaction per target id whatever the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Video,
    Comment,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Comment => "comment",
        }
    }
}

impl FromStr for TargetKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "comment" => Ok(Self::Comment),
            other => Err(ParseEnumError::new("target kind", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTarget {
    pub kind: TargetKind,
    pub id: Uuid,
}

impl ReactionTarget {
    pub fn video(id: Uuid) -> Self {
        Self {
            kind: TargetKind::Video,
            id,
        }
    }

    pub fn comment(id: Uuid) -> Self {
        Self {
            kind: TargetKind::Comment,
            id,
        }
    }
}

/// A user's standing reaction on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionState {
    None,
    Liked,
    Disliked,
}

/// Store write needed to move from one [`ReactionState`] to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Insert(ReactionType),
    Update(ReactionType),
    Delete,
}

impl ReactionState {
    /// Re-requesting the current reaction clears it; requesting the other one
    /// flips the existing row in place.
    pub fn toggle(self, requested: ReactionType) -> (Transition, ReactionState) {
        match (self, requested) {
            (Self::None, ty) => (Transition::Insert(ty), ty.into()),
            (Self::Liked, ReactionType::Like) | (Self::Disliked, ReactionType::Dislike) => {
                (Transition::Delete, Self::None)
            }
            (Self::Liked, ReactionType::Dislike) => {
                (Transition::Update(ReactionType::Dislike), Self::Disliked)
            }
            (Self::Disliked, ReactionType::Like) => {
                (Transition::Update(ReactionType::Like), Self::Liked)
            }
        }
    }
}

impl From<ReactionType> for ReactionState {
    fn from(ty: ReactionType) -> Self {
        match ty {
            ReactionType::Like => Self::Liked,
            ReactionType::Dislike => Self::Disliked,
        }
    }
}

impl From<Option<ReactionType>> for ReactionState {
    fn from(ty: Option<ReactionType>) -> Self {
        ty.map_or(Self::None, Self::from)
    }
}

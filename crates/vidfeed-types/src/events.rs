use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Outer shape shared by identity and media provider callbacks:
/// `{"type": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("payload is not a valid event envelope: {0}")]
    Envelope(serde_json::Error),
    #[error("invalid {event_type} payload: {source}")]
    Data {
        event_type: String,
        source: serde_json::Error,
    },
    #[error("{event_type} payload is missing {field}")]
    MissingField {
        event_type: String,
        field: &'static str,
    },
}

impl WebhookEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(body).map_err(EventError::Envelope)
    }

    fn data<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_value(self.data.clone()).map_err(|source| EventError::Data {
            event_type: self.event_type.clone(),
            source,
        })
    }

    fn missing(&self, field: &'static str) -> EventError {
        EventError::MissingField {
            event_type: self.event_type.clone(),
            field,
        }
    }
}

// -- Identity provider --

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
}

impl IdentityUser {
    /// Explicit `name` wins; otherwise first and last name joined.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedUser {
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum IdentityEvent {
    UserCreated(IdentityUser),
    UserUpdated(IdentityUser),
    UserDeleted { id: String },
}

impl IdentityEvent {
    /// `Ok(None)` for event types we do not consume.
    pub fn from_envelope(envelope: &WebhookEnvelope) -> Result<Option<Self>, EventError> {
        let event = match envelope.event_type.as_str() {
            "user.created" => Self::UserCreated(envelope.data()?),
            "user.updated" => Self::UserUpdated(envelope.data()?),
            "user.deleted" => {
                let deleted: DeletedUser = envelope.data()?;
                let id = deleted
                    .id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| envelope.missing("id"))?;
                Self::UserDeleted { id }
            }
            _ => return Ok(None),
        };

        if let Self::UserCreated(user) | Self::UserUpdated(user) = &event {
            if user.id.is_empty() {
                return Err(envelope.missing("id"));
            }
        }
        Ok(Some(event))
    }
}

// -- Media provider --

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetData {
    /// Provider asset id.
    pub id: String,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackRef>,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum MediaEvent {
    AssetCreated {
        upload_id: String,
        asset_id: String,
    },
    AssetReady {
        asset_id: String,
        upload_id: Option<String>,
        playback_id: String,
        duration_ms: Option<i64>,
    },
    AssetErrored {
        asset_id: String,
        upload_id: Option<String>,
    },
    AssetDeleted {
        asset_id: String,
        upload_id: Option<String>,
    },
}

impl MediaEvent {
    pub fn from_envelope(envelope: &WebhookEnvelope) -> Result<Option<Self>, EventError> {
        let event = match envelope.event_type.as_str() {
            "video.asset.created" => {
                let data: AssetData = envelope.data()?;
                let upload_id = data.upload_id.ok_or_else(|| envelope.missing("upload_id"))?;
                Self::AssetCreated {
                    upload_id,
                    asset_id: data.id,
                }
            }
            "video.asset.ready" => {
                let data: AssetData = envelope.data()?;
                let playback_id = data
                    .playback_ids
                    .into_iter()
                    .next()
                    .map(|p| p.id)
                    .ok_or_else(|| envelope.missing("playback_ids"))?;
                Self::AssetReady {
                    asset_id: data.id,
                    upload_id: data.upload_id,
                    playback_id,
                    duration_ms: data.duration.map(|secs| (secs * 1000.0).round() as i64),
                }
            }
            "video.asset.errored" => {
                let data: AssetData = envelope.data()?;
                Self::AssetErrored {
                    asset_id: data.id,
                    upload_id: data.upload_id,
                }
            }
            "video.asset.deleted" => {
                let data: AssetData = envelope.data()?;
                Self::AssetDeleted {
                    asset_id: data.id,
                    upload_id: data.upload_id,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

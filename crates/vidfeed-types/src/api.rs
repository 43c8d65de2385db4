use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{AssetStatus, ReactionState, ReactionTarget, ReactionType, Visibility};

// -- Identity --

/// Claims of the identity token issued by the external provider. `sub` is the
/// provider's user id, not ours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Users --

/// A creator's channel page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileView {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub subscriber_count: i64,
    /// Public videos only.
    pub video_count: i64,
    pub viewer_subscribed: bool,
}

// -- Videos --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerView {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber_count: Option<i64>,
}

/// A video as it appears in feeds and on its own page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub visibility: Visibility,
    pub status: AssetStatus,
    pub playback_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner: OwnerView,
    pub view_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub viewer_reaction: Option<ReactionType>,
    pub viewer_subscribed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoResponse {
    pub video_id: Uuid,
    pub upload_url: String,
}

/// Absent fields are left alone. `description` and `categoryId` may be sent
/// as `null` to clear them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateVideoRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<Uuid>>,
    pub visibility: Option<Visibility>,
}

/// Present-but-null becomes `Some(None)`; `default` covers the absent case.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub target: ReactionTarget,
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub state: ReactionState,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub video_id: Uuid,
    pub author: OwnerView,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: i64,
    pub dislike_count: i64,
    pub viewer_reaction: Option<ReactionType>,
}

// -- Subscriptions --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscribed: bool,
}

// -- Categories --

#[derive(Debug, Serialize)]
pub struct CategoryView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_tells_null_from_absent() {
        let req: UpdateVideoRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(req.description.is_none());
        assert!(req.category_id.is_none());

        let req: UpdateVideoRequest =
            serde_json::from_str(r#"{"description":null,"categoryId":null}"#).unwrap();
        assert_eq!(req.description, Some(None));
        assert_eq!(req.category_id, Some(None));

        let req: UpdateVideoRequest = serde_json::from_str(
            r#"{"description":"hi","categoryId":"00000000-0000-0000-0000-000000000001"}"#,
        )
        .unwrap();
        assert_eq!(req.description, Some(Some("hi".to_string())));
        assert_eq!(req.category_id, Some(Some(Uuid::from_u128(1))));
    }
}

pub mod auth;
pub mod categories;
pub mod comments;
pub mod error;
pub mod feed;
pub mod media;
pub mod middleware;
pub mod reactions;
pub mod studio;
pub mod subscriptions;
pub mod users;
pub mod videos;
pub mod webhooks;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Every route of the service. Webhooks authenticate by signature and sit
/// outside the token middleware.
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/feed/discover", get(feed::discover))
        .route("/feed/trending", get(feed::trending))
        .route("/feed/subscribed", get(feed::subscribed))
        .route("/reactions", post(reactions::toggle_reaction))
        .route("/videos", post(videos::create_video))
        .route(
            "/videos/{id}",
            get(videos::get_video)
                .patch(videos::update_video)
                .delete(videos::delete_video),
        )
        .route("/videos/{id}/views", post(videos::record_view))
        .route("/videos/{id}/suggestions", get(feed::suggestions))
        .route(
            "/videos/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/studio/videos", get(studio::list_studio_videos))
        .route("/users/{id}", get(users::get_user))
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .route(
            "/subscriptions/{creator_id}",
            post(subscriptions::subscribe).delete(subscriptions::unsubscribe),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/categories", get(categories::list_categories))
        .route("/webhooks/identity", post(webhooks::identity_webhook))
        .route("/webhooks/media", post(webhooks::media_webhook))
        .route("/health", get(categories::health))
        .with_state(state);

    Router::new().merge(api_routes).merge(public_routes)
}

use anyhow::Context;
use axum::{Json, extract::State};

use vidfeed_types::api::CategoryView;

use crate::auth::{AppState, with_db};
use crate::error::ApiError;

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryView>>, ApiError> {
    let rows = with_db(&state, |db| Ok(db.list_categories()?)).await?;

    let views = rows
        .into_iter()
        .map(|row| {
            Ok(CategoryView {
                id: row.id.parse().context("category id")?,
                name: row.name,
                description: row.description,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(views))
}

pub async fn health() -> &'static str {
    "ok"
}

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::{ApiState, handlers};

pub fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route(
            "/api/applications",
            get(handlers::applications::list_applications)
                .post(handlers::applications::create_application),
        )
        .route(
            "/api/applications/:id",
            get(handlers::applications::get_application)
                .put(handlers::applications::update_application)
                .delete(handlers::applications::delete_application),
        )
}

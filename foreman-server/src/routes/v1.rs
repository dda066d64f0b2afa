use axum::{
    Router, middleware,
    routing::{any, delete, get, post, put},
};

use foreman_core::api_routes::v1;

use crate::{
    handlers::{debug, folders, locks, nodes, tasks},
    infra::app_state::AppState,
    middleware::auth,
    websocket::websocket_handler,
};

/// Create all v1 API routes
pub fn create_v1_router(state: AppState) -> Router<AppState> {
    Router::new()
        // Node catalog and liveness
        .route(v1::nodes::REGISTER, post(nodes::register_node))
        .route(v1::nodes::COLLECTION, get(nodes::list_available_nodes))
        .route(v1::nodes::ALL, get(nodes::list_all_nodes))
        .route(v1::nodes::ITEM, get(nodes::get_node))
        .route(v1::nodes::HEARTBEAT, post(nodes::heartbeat))
        .route(v1::nodes::DISCONNECT, post(nodes::disconnect_node))
        // Task lifecycle
        .route(
            v1::tasks::COLLECTION,
            post(tasks::create_task).get(tasks::list_tasks),
        )
        .route(v1::tasks::POLL, get(tasks::poll_for_node))
        .route(
            v1::tasks::ITEM,
            get(tasks::get_task).delete(tasks::delete_task),
        )
        .route(v1::tasks::STATUS, put(tasks::update_task_status))
        .route(v1::tasks::ASSIGN, put(tasks::assign_task))
        // Fan-out folder progress
        .route(
            v1::tasks::FOLDERS,
            get(folders::list_folders).post(folders::create_folders),
        )
        .route(v1::tasks::FOLDERS_CLAIM, post(folders::claim_folder))
        .route(
            v1::tasks::PROGRESS,
            get(tasks::task_progress).post(tasks::report_task_progress),
        )
        .route(v1::folders::STATUS, put(folders::report_folder))
        // Advisory file locks
        .route(
            v1::locks::COLLECTION,
            post(locks::acquire_lock)
                .get(locks::list_locks)
                .delete(locks::release_lock),
        )
        .route(v1::locks::REFRESH, post(locks::refresh_lock))
        .route(v1::locks::ALL, delete(locks::reset_locks))
        // Diagnostics and the push channel
        .route(v1::debug::MESSAGES, post(debug::post_debug_message))
        .route(v1::events::WS, any(websocket_handler))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::auth_middleware,
        ))
}

//! Canonical API route paths, shared between the server router and clients.

pub mod v1 {
    pub mod nodes {
        pub const REGISTER: &str = "/api/v1/nodes/register";
        pub const COLLECTION: &str = "/api/v1/nodes";
        pub const ALL: &str = "/api/v1/nodes/all";
        pub const ITEM: &str = "/api/v1/nodes/{id}";
        pub const HEARTBEAT: &str = "/api/v1/nodes/{id}/heartbeat";
        pub const DISCONNECT: &str = "/api/v1/nodes/{id}/disconnect";
    }

    pub mod tasks {
        pub const COLLECTION: &str = "/api/v1/tasks";
        pub const ITEM: &str = "/api/v1/tasks/{id}";
        pub const STATUS: &str = "/api/v1/tasks/{id}/status";
        pub const ASSIGN: &str = "/api/v1/tasks/{id}/assign/{node_id}";
        pub const POLL: &str = "/api/v1/tasks/poll";
        pub const FOLDERS: &str = "/api/v1/tasks/{id}/folders";
        pub const FOLDERS_CLAIM: &str = "/api/v1/tasks/{id}/folders/claim";
        pub const PROGRESS: &str = "/api/v1/tasks/{id}/progress";
    }

    pub mod folders {
        pub const STATUS: &str = "/api/v1/folders/{id}/status";
    }

    pub mod locks {
        pub const COLLECTION: &str = "/api/v1/locks";
        pub const REFRESH: &str = "/api/v1/locks/refresh";
        pub const ALL: &str = "/api/v1/locks/all";
    }

    pub mod debug {
        pub const MESSAGES: &str = "/api/v1/debug/messages";
    }

    pub mod events {
        pub const WS: &str = "/api/v1/events/ws";
    }
}

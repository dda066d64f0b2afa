use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One subscribed push-channel client and its interest groups.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID
    pub id: Uuid,
    /// Groups this client currently listens to (`debug`, `tasks:all`,
    /// `task:<id>`, `nodes`)
    groups: RwLock<HashSet<String>>,
}

impl Connection {
    pub fn new(initial_groups: HashSet<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            groups: RwLock::new(initial_groups),
        }
    }

    pub async fn join(&self, group: String) {
        self.groups.write().await.insert(group);
    }

    pub async fn leave(&self, group: &str) {
        self.groups.write().await.remove(group);
    }

    /// Whether any of the event's delivery groups is subscribed here.
    pub async fn interested(&self, event_groups: &[String]) -> bool {
        let groups = self.groups.read().await;
        event_groups.iter().any(|g| groups.contains(g))
    }

    pub async fn current_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.groups.read().await.iter().cloned().collect();
        groups.sort();
        groups
    }
}

//! Server directory
//!
//! Owns the candidate server list and the active selection. All mutation
//! goes through `fetch_servers` and the `select*` methods; observers
//! subscribe to [`DirectoryEvent`]s instead of reading fields.

pub mod catalog;

use catalog::{fallback_servers, Catalog};
use measure::geo::Coordinates;
use measure::Server;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    /// The list was replaced; carries the new distance-sorted list
    ServersUpdated(Vec<Server>),
    /// The active server changed
    Selected(Server),
}

#[derive(Default)]
struct DirectoryState {
    servers: Vec<Server>,
    selected: Option<Server>,
    location: Option<Coordinates>,
}

pub struct ServerDirectory {
    catalog: Arc<dyn Catalog>,
    state: RwLock<DirectoryState>,
    events: broadcast::Sender<DirectoryEvent>,
}

impl ServerDirectory {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            catalog,
            state: RwLock::new(DirectoryState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    /// Refresh the list from the catalog
    ///
    /// Never fails: an unreachable, malformed or empty catalog yields the
    /// built-in fallback list. The list is replaced wholesale and sorted by
    /// distance from `location` (or the last known location when `None`).
    pub async fn fetch_servers(&self, location: Option<Coordinates>) -> Vec<Server> {
        let mut servers = match self.catalog.fetch().await {
            Ok(servers) if !servers.is_empty() => servers,
            Ok(_) => {
                warn!("Server catalog was empty, using built-in servers");
                fallback_servers()
            }
            Err(e) => {
                warn!("Server catalog unavailable, using built-in servers: {:#}", e);
                fallback_servers()
            }
        };

        let mut state = self.state.write().await;
        if location.is_some() {
            state.location = location;
        }
        let user = state.location;

        for server in &mut servers {
            server.update_distance(user);
        }
        // Stable sort keeps catalog order for equal distances
        servers.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

        let previous = state.selected.as_ref().map(|s| s.id.clone());
        let selected = previous
            .and_then(|id| servers.iter().find(|s| s.id == id).cloned())
            .or_else(|| servers.iter().find(|s| s.is_default).cloned())
            .or_else(|| servers.first().cloned());

        info!("Server directory holds {} servers", servers.len());
        state.servers = servers.clone();
        let changed = state.selected != selected;
        state.selected = selected.clone();
        drop(state);

        let _ = self.events.send(DirectoryEvent::ServersUpdated(servers.clone()));
        if changed {
            if let Some(server) = selected {
                let _ = self.events.send(DirectoryEvent::Selected(server));
            }
        }

        servers
    }

    /// Record a new user location and re-rank the current list
    pub async fn set_location(&self, location: Option<Coordinates>) {
        let mut state = self.state.write().await;
        state.location = location;
        let mut servers = std::mem::take(&mut state.servers);
        for server in &mut servers {
            server.update_distance(location);
        }
        servers.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        if let Some(selected) = state.selected.as_mut() {
            selected.update_distance(location);
        }
        state.servers = servers.clone();
        drop(state);

        let _ = self.events.send(DirectoryEvent::ServersUpdated(servers));
    }

    pub async fn select(&self, server: &Server) {
        let mut state = self.state.write().await;
        state.selected = Some(server.clone());
        drop(state);

        debug!("Selected server {} ({})", server.name, server.host);
        let _ = self.events.send(DirectoryEvent::Selected(server.clone()));
    }

    /// Select the listed server with `id`
    pub async fn select_by_id(&self, id: &str) -> Option<Server> {
        let server = {
            let state = self.state.read().await;
            state.servers.iter().find(|s| s.id == id).cloned()
        }?;
        self.select(&server).await;
        Some(server)
    }

    /// Select the head of the distance-sorted list; no-op when empty
    pub async fn select_closest(&self) -> Option<Server> {
        let closest = self.state.read().await.servers.first().cloned()?;
        self.select(&closest).await;
        Some(closest)
    }

    /// Case-insensitive search over name, city, country and provider
    ///
    /// A blank query returns the whole list.
    pub async fn search(&self, query: &str) -> Vec<Server> {
        let state = self.state.read().await;
        let query = query.trim();
        if query.is_empty() {
            return state.servers.clone();
        }
        state
            .servers
            .iter()
            .filter(|s| s.matches(query))
            .cloned()
            .collect()
    }

    pub async fn selected(&self) -> Option<Server> {
        self.state.read().await.selected.clone()
    }

    pub async fn servers(&self) -> Vec<Server> {
        self.state.read().await.servers.clone()
    }
}

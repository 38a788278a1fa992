//! Browse-side lobby cache.
//!
//! Browsing peers learn about lobbies from `LobbyInfo` broadcasts and keep
//! whole-snapshot copies here. Consistency is last-writer-wins: a repeat
//! `LobbyInfo` for the same lobby id replaces the cached entry wholesale,
//! never a field-by-field merge — each lobby has a single writer (its
//! host), so the newest snapshot is always the truth.

use std::collections::HashMap;
use std::sync::Mutex;

use coinop_protocol::{ClientId, Lobby, LobbyId};

/// Thread-safe map of every lobby a browsing peer currently knows about.
///
/// Guarded by its own lock, independent of the connection registry, so a
/// render pass never contends with network bookkeeping.
#[derive(Debug, Default)]
pub struct LobbyDirectory {
    inner: Mutex<HashMap<LobbyId, Lobby>>,
}

impl LobbyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the snapshot for this lobby (last-writer-wins).
    pub fn upsert(&self, lobby: Lobby) {
        self.inner.lock().unwrap().insert(lobby.id.clone(), lobby);
    }

    /// Drops a lobby from the cache (it ended or its host vanished).
    pub fn remove(&self, id: &LobbyId) -> Option<Lobby> {
        self.inner.lock().unwrap().remove(id)
    }

    /// Drops every lobby hosted by the given peer. Returns how many went.
    ///
    /// Called when a host disconnects — its lobbies silently disappear from
    /// the browse list rather than surfacing an error.
    pub fn remove_hosted_by(&self, host: &ClientId) -> usize {
        let mut map = self.inner.lock().unwrap();
        let before = map.len();
        map.retain(|_, lobby| &lobby.host_id != host);
        before - map.len()
    }

    pub fn get(&self, id: &LobbyId) -> Option<Lobby> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    /// A stable-ordered snapshot for rendering (sorted by lobby id).
    pub fn snapshot(&self) -> Vec<Lobby> {
        let map = self.inner.lock().unwrap();
        let mut lobbies: Vec<Lobby> = map.values().cloned().collect();
        lobbies.sort_by(|a, b| a.id.cmp(&b.id));
        lobbies
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use coinop_protocol::{GameKind, Player};

    fn lobby(id: &str, host: &str, name: &str) -> Lobby {
        Lobby {
            id: LobbyId::new(id),
            name: name.into(),
            private: false,
            code: String::new(),
            game: GameKind::Tron,
            capacity: 4,
            host_id: ClientId::new(host),
            roster: vec![Player {
                client_id: ClientId::new(host),
                username: "host".into(),
                host: true,
            }],
        }
    }

    #[test]
    fn test_upsert_then_get() {
        let dir = LobbyDirectory::new();
        dir.upsert(lobby("l1", "h1", "first"));

        let cached = dir.get(&LobbyId::new("l1")).expect("cached");
        assert_eq!(cached.name, "first");
    }

    #[test]
    fn test_repeat_upsert_is_last_writer_wins() {
        let dir = LobbyDirectory::new();
        dir.upsert(lobby("l1", "h1", "first"));

        // Second snapshot with a different name AND a bigger roster.
        let mut second = lobby("l1", "h1", "renamed");
        second.roster.push(Player {
            client_id: ClientId::new("p2"),
            username: "joan".into(),
            host: false,
        });
        dir.upsert(second.clone());

        let cached = dir.get(&LobbyId::new("l1")).unwrap();
        // Exactly the second message's fields — never a merge of the two.
        assert_eq!(cached, second);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_remove_hosted_by_drops_only_that_hosts_lobbies() {
        let dir = LobbyDirectory::new();
        dir.upsert(lobby("l1", "h1", "a"));
        dir.upsert(lobby("l2", "h1", "b"));
        dir.upsert(lobby("l3", "h2", "c"));

        let dropped = dir.remove_hosted_by(&ClientId::new("h1"));

        assert_eq!(dropped, 2);
        assert!(dir.get(&LobbyId::new("l1")).is_none());
        assert!(dir.get(&LobbyId::new("l3")).is_some());
    }

    #[test]
    fn test_snapshot_is_sorted_by_id() {
        let dir = LobbyDirectory::new();
        dir.upsert(lobby("l3", "h", "c"));
        dir.upsert(lobby("l1", "h", "a"));
        dir.upsert(lobby("l2", "h", "b"));

        let ids: Vec<String> = dir
            .snapshot()
            .iter()
            .map(|l| l.id.as_str().to_string())
            .collect();

        assert_eq!(ids, vec!["l1", "l2", "l3"]);
    }

    #[test]
    fn test_remove_missing_returns_none() {
        let dir = LobbyDirectory::new();
        assert!(dir.remove(&LobbyId::new("ghost")).is_none());
    }
}

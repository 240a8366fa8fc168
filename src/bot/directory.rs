//! Entity directory.
//!
//! Point-in-time lookup tables for the users, channels, groups and direct
//! sessions the bot can see. The directory is built from the snapshot the
//! platform delivers on connect and is replaced wholesale on every reconnect:
//!
//! - By ID (primary)
//! - By name (for resolving configured names such as the announcer)

use std::collections::HashMap;
use std::sync::Arc;

/// The kinds of entity the platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Channel,
    Group,
    DirectSession,
}

impl EntityKind {
    const ALL: [EntityKind; 4] = [
        EntityKind::User,
        EntityKind::Channel,
        EntityKind::Group,
        EntityKind::DirectSession,
    ];
}

/// A resolved platform entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: String,
    /// Human-readable name. For direct sessions this is the owning user's name.
    pub name: Option<String>,
    /// Owning user ID (direct sessions only).
    pub user: Option<String>,
}

/// A named entry in a connection snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntry {
    pub id: String,
    pub name: String,
}

impl NamedEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A direct session entry in a connection snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub id: String,
    pub user: String,
}

impl SessionEntry {
    pub fn new(id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user: user.into(),
        }
    }
}

/// Everything the platform reported about the workspace at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub users: Vec<NamedEntry>,
    pub channels: Vec<NamedEntry>,
    pub groups: Vec<NamedEntry>,
    pub direct_sessions: Vec<SessionEntry>,
}

#[derive(Debug, Default)]
struct Table {
    by_id: HashMap<String, Arc<Entity>>,
    by_name: HashMap<String, Arc<Entity>>,
}

impl Table {
    fn insert(&mut self, entity: Entity) {
        let entity = Arc::new(entity);
        if let Some(name) = entity.name.clone() {
            self.by_name.insert(name, Arc::clone(&entity));
        }
        self.by_id.insert(entity.id.clone(), entity);
    }
}

/// Directory of platform entities for one connection epoch.
#[derive(Debug, Default)]
pub struct Directory {
    tables: HashMap<EntityKind, Table>,
}

impl Directory {
    /// Build a directory from a connection snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut tables: HashMap<EntityKind, Table> = EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, Table::default()))
            .collect();

        let named = [
            (EntityKind::User, &snapshot.users),
            (EntityKind::Channel, &snapshot.channels),
            (EntityKind::Group, &snapshot.groups),
        ];
        for (kind, entries) in named {
            let table = tables.entry(kind).or_default();
            for entry in entries {
                table.insert(Entity {
                    kind,
                    id: entry.id.clone(),
                    name: Some(entry.name.clone()),
                    user: None,
                });
            }
        }

        // Session names come from the owning user; unknown owners stay unnamed.
        let user_names: HashMap<&str, &str> = snapshot
            .users
            .iter()
            .map(|u| (u.id.as_str(), u.name.as_str()))
            .collect();
        let sessions = tables.entry(EntityKind::DirectSession).or_default();
        for entry in &snapshot.direct_sessions {
            sessions.insert(Entity {
                kind: EntityKind::DirectSession,
                id: entry.id.clone(),
                name: user_names.get(entry.user.as_str()).map(|n| n.to_string()),
                user: Some(entry.user.clone()),
            });
        }

        Self { tables }
    }

    /// Replace every table with the contents of a new snapshot.
    pub fn rebuild(&mut self, snapshot: &Snapshot) {
        *self = Self::from_snapshot(snapshot);
    }

    /// Look up an entity by ID.
    pub fn resolve(&self, kind: EntityKind, id: &str) -> Option<Arc<Entity>> {
        self.tables.get(&kind)?.by_id.get(id).cloned()
    }

    /// Look up an entity by name.
    pub fn resolve_by_name(&self, kind: EntityKind, name: &str) -> Option<Arc<Entity>> {
        self.tables.get(&kind)?.by_name.get(name).cloned()
    }

    pub fn user(&self, id: &str) -> Option<Arc<Entity>> {
        self.resolve(EntityKind::User, id)
    }

    pub fn user_by_name(&self, name: &str) -> Option<Arc<Entity>> {
        self.resolve_by_name(EntityKind::User, name)
    }

    /// Look up a direct session by channel ID.
    pub fn direct_session(&self, id: &str) -> Option<Arc<Entity>> {
        self.resolve(EntityKind::DirectSession, id)
    }

    /// Number of entities of the given kind.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.tables.get(&kind).map(|t| t.by_id.len()).unwrap_or(0)
    }
}

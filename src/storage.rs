//! SQLite storage layer for rapport.
//!
//! One database file holds profiles, their directed edges, groups with
//! their members, and chats with their members and messages. Every public
//! method runs as a single statement or a single transaction.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::model::{
    Chat, ChatMembership, ChatMessage, Edge, Group, GroupMember, GroupRole, LastMessage, Profile,
    RelationshipStatus,
};
use crate::store::ProfileStore;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    NotFound(String),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

const PROFILE_COLUMNS: &str = "id, user_id, phone, first_name, last_name, bio, avatar,
                               cover_image, created_at, updated_at";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        phone: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        bio: row.get(5)?,
        avatar: row.get(6)?,
        cover_image: row.get(7)?,
        created_at: row.get::<_, i64>(8)? as u64,
        updated_at: row.get::<_, i64>(9)? as u64,
        edges: Vec::new(),
        chats: Vec::new(),
    })
}

const EDGE_COLUMNS: &str = "owner_id, target_id, display_name, status, chat_id,
                            is_best_friend, revision, updated_at";

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    let status: String = row.get(3)?;
    Ok(Edge {
        owner_id: row.get(0)?,
        target_id: row.get(1)?,
        display_name: row.get(2)?,
        status: status
            .parse::<RelationshipStatus>()
            .map_err(|e| conversion_error(3, e))?,
        chat_id: row.get(4)?,
        is_best_friend: row.get::<_, i32>(5)? != 0,
        revision: row.get::<_, i64>(6)? as u64,
        updated_at: row.get::<_, i64>(7)? as u64,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<GroupMember> {
    let role: String = row.get(1)?;
    Ok(GroupMember {
        profile_id: row.get(0)?,
        role: GroupRole::parse(&role)
            .ok_or_else(|| conversion_error(1, format!("unknown group role: {role}")))?,
        join_method: row.get(2)?,
        joined_at: row.get::<_, i64>(3)? as u64,
    })
}

fn collect<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, StorageError> {
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// SQLite-backed [`ProfileStore`].
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a database at `path` and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.create_schema()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.create_schema()?;
        Ok(storage)
    }

    // A panic while holding the connection leaves no half-finished statement
    // behind, so a poisoned lock is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS profiles (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL UNIQUE,
                phone       TEXT NOT NULL UNIQUE,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                bio         TEXT,
                avatar      TEXT,
                cover_image TEXT,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS edges (
                owner_id       TEXT NOT NULL,
                target_id      TEXT NOT NULL,
                display_name   TEXT NOT NULL,
                status         TEXT NOT NULL,
                chat_id        TEXT,
                is_best_friend INTEGER NOT NULL DEFAULT 0,
                revision       INTEGER NOT NULL DEFAULT 0,
                updated_at     INTEGER NOT NULL,
                PRIMARY KEY (owner_id, target_id)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_owner_status ON edges(owner_id, status);

            CREATE TABLE IF NOT EXISTS groups (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                avatar     TEXT,
                chat_id    TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_members (
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                profile_id  TEXT NOT NULL,
                role        TEXT NOT NULL,
                join_method TEXT NOT NULL,
                joined_at   INTEGER NOT NULL,
                position    INTEGER NOT NULL,
                PRIMARY KEY (group_id, profile_id)
            );
            CREATE INDEX IF NOT EXISTS idx_group_members_profile ON group_members(profile_id);

            CREATE TABLE IF NOT EXISTS chats (
                id                   TEXT PRIMARY KEY,
                is_group             INTEGER NOT NULL,
                group_id             TEXT,
                last_message_content TEXT,
                last_message_at      INTEGER,
                created_at           INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_members (
                chat_id    TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                profile_id TEXT NOT NULL,
                join_time  INTEGER NOT NULL,
                PRIMARY KEY (chat_id, profile_id)
            );
            CREATE INDEX IF NOT EXISTS idx_chat_members_profile ON chat_members(profile_id);

            CREATE TABLE IF NOT EXISTS chat_messages (
                message_id TEXT PRIMARY KEY,
                chat_id    TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id  TEXT,
                kind       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_chat ON chat_messages(chat_id, created_at);
            ",
        )?;
        Ok(())
    }

    fn load_profile(
        conn: &Connection,
        column: &str,
        value: &str,
    ) -> Result<Option<Profile>, StorageError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE {column} = ?1");
        let profile = conn
            .query_row(&sql, params![value], profile_from_row)
            .optional()?;
        let Some(mut profile) = profile else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE owner_id = ?1 ORDER BY updated_at"
        ))?;
        profile.edges = collect(stmt.query_map(params![profile.id], edge_from_row)?)?;

        let mut stmt = conn.prepare(
            "SELECT chat_id, profile_id, join_time FROM chat_members
             WHERE profile_id = ?1 ORDER BY join_time",
        )?;
        profile.chats = collect(stmt.query_map(params![profile.id], |row| {
            Ok(ChatMembership {
                chat_id: row.get(0)?,
                profile_id: row.get(1)?,
                join_time: row.get::<_, i64>(2)? as u64,
            })
        })?)?;

        Ok(Some(profile))
    }

    fn update_profile_row(conn: &Connection, p: &Profile) -> Result<(), StorageError> {
        let affected = conn
            .execute(
                "UPDATE profiles SET phone = ?2, first_name = ?3, last_name = ?4, bio = ?5,
                        avatar = ?6, cover_image = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    p.id,
                    p.phone,
                    p.first_name,
                    p.last_name,
                    p.bio,
                    p.avatar,
                    p.cover_image,
                    p.updated_at as i64,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StorageError::AlreadyExists(format!("phone {}", p.phone))
                } else {
                    StorageError::Sqlite(e)
                }
            })?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("profile {}", p.id)));
        }
        Ok(())
    }

    fn load_group(conn: &Connection, group_id: &str) -> Result<Option<Group>, StorageError> {
        let group = conn
            .query_row(
                "SELECT id, name, avatar, chat_id, created_at, updated_at
                 FROM groups WHERE id = ?1",
                params![group_id],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        avatar: row.get(2)?,
                        chat_id: row.get(3)?,
                        members: Vec::new(),
                        created_at: row.get::<_, i64>(4)? as u64,
                        updated_at: row.get::<_, i64>(5)? as u64,
                    })
                },
            )
            .optional()?;
        let Some(mut group) = group else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(
            "SELECT profile_id, role, join_method, joined_at FROM group_members
             WHERE group_id = ?1 ORDER BY position",
        )?;
        group.members = collect(stmt.query_map(params![group_id], member_from_row)?)?;
        Ok(Some(group))
    }

    fn write_members(conn: &Connection, group: &Group) -> Result<(), StorageError> {
        conn.execute(
            "DELETE FROM group_members WHERE group_id = ?1",
            params![group.id],
        )?;
        for (position, m) in group.members.iter().enumerate() {
            conn.execute(
                "INSERT INTO group_members
                 (group_id, profile_id, role, join_method, joined_at, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    group.id,
                    m.profile_id,
                    m.role.as_str(),
                    m.join_method,
                    m.joined_at as i64,
                    position as i64,
                ],
            )?;
        }
        Ok(())
    }
}

impl ProfileStore for Storage {
    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    fn find_profile(&self, id: &str) -> Result<Option<Profile>, StorageError> {
        Self::load_profile(&self.conn(), "id", id)
    }

    fn find_profile_by_user(&self, user_id: &str) -> Result<Option<Profile>, StorageError> {
        Self::load_profile(&self.conn(), "user_id", user_id)
    }

    fn find_profile_by_phone(&self, phone: &str) -> Result<Option<Profile>, StorageError> {
        Self::load_profile(&self.conn(), "phone", phone)
    }

    fn insert_profile(&self, p: &Profile) -> Result<(), StorageError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO profiles ({PROFILE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    p.id,
                    p.user_id,
                    p.phone,
                    p.first_name,
                    p.last_name,
                    p.bio,
                    p.avatar,
                    p.cover_image,
                    p.created_at as i64,
                    p.updated_at as i64,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StorageError::AlreadyExists(format!("profile for user {}", p.user_id))
                } else {
                    StorageError::Sqlite(e)
                }
            })?;
        Ok(())
    }

    fn save_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        Self::update_profile_row(&self.conn(), profile)
    }

    fn save_profiles(&self, profiles: &[Profile]) -> Result<(), StorageError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        for p in profiles {
            Self::update_profile_row(&tx, p)?;
        }
        tx.commit()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    fn get_edge(&self, owner_id: &str, target_id: &str) -> Result<Option<Edge>, StorageError> {
        let edge = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM edges WHERE owner_id = ?1 AND target_id = ?2"
                ),
                params![owner_id, target_id],
                edge_from_row,
            )
            .optional()?;
        Ok(edge)
    }

    fn put_edge(&self, e: &Edge) -> Result<(), StorageError> {
        self.conn().execute(
            &format!(
                "INSERT OR REPLACE INTO edges ({EDGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                e.owner_id,
                e.target_id,
                e.display_name,
                e.status.as_str(),
                e.chat_id,
                e.is_best_friend as i32,
                e.revision as i64,
                e.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    fn delete_edge(&self, owner_id: &str, target_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn().execute(
            "DELETE FROM edges WHERE owner_id = ?1 AND target_id = ?2",
            params![owner_id, target_id],
        )?;
        Ok(affected > 0)
    }

    fn list_edges(
        &self,
        owner_id: &str,
        status: Option<RelationshipStatus>,
    ) -> Result<Vec<Edge>, StorageError> {
        let conn = self.conn();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EDGE_COLUMNS} FROM edges
                     WHERE owner_id = ?1 AND status = ?2 ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map(params![owner_id, status.as_str()], edge_from_row)?;
                collect(rows)
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EDGE_COLUMNS} FROM edges
                     WHERE owner_id = ?1 ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map(params![owner_id], edge_from_row)?;
                collect(rows)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Chats
    // -----------------------------------------------------------------------

    fn insert_chat(&self, chat: &Chat, first_message: &ChatMessage) -> Result<(), StorageError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO chats
             (id, is_group, group_id, last_message_content, last_message_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chat.id,
                chat.is_group as i32,
                chat.group_id,
                chat.last_message.as_ref().map(|m| m.content.clone()),
                chat.last_message.as_ref().map(|m| m.created_at as i64),
                chat.created_at as i64,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StorageError::AlreadyExists(format!("chat {}", chat.id))
            } else {
                StorageError::Sqlite(e)
            }
        })?;
        for member in &chat.members {
            tx.execute(
                "INSERT OR IGNORE INTO chat_members (chat_id, profile_id, join_time)
                 VALUES (?1, ?2, ?3)",
                params![chat.id, member, chat.created_at as i64],
            )?;
        }
        tx.execute(
            "INSERT INTO chat_messages (message_id, chat_id, sender_id, kind, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                first_message.message_id,
                chat.id,
                first_message.sender_id,
                first_message.kind.as_str(),
                first_message.content,
                first_message.created_at as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StorageError> {
        let conn = self.conn();
        let chat = conn
            .query_row(
                "SELECT id, is_group, group_id, last_message_content, last_message_at, created_at
                 FROM chats WHERE id = ?1",
                params![chat_id],
                |row| {
                    let content: Option<String> = row.get(3)?;
                    let at: Option<i64> = row.get(4)?;
                    Ok(Chat {
                        id: row.get(0)?,
                        is_group: row.get::<_, i32>(1)? != 0,
                        group_id: row.get(2)?,
                        members: Vec::new(),
                        last_message: content.map(|content| LastMessage {
                            content,
                            created_at: at.unwrap_or_default() as u64,
                        }),
                        created_at: row.get::<_, i64>(5)? as u64,
                    })
                },
            )
            .optional()?;
        let Some(mut chat) = chat else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(
            "SELECT profile_id FROM chat_members WHERE chat_id = ?1 ORDER BY join_time, rowid",
        )?;
        chat.members = collect(stmt.query_map(params![chat_id], |row| row.get(0))?)?;
        Ok(Some(chat))
    }

    fn delete_chat(&self, chat_id: &str) -> Result<bool, StorageError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM chat_messages WHERE chat_id = ?1", params![chat_id])?;
        tx.execute("DELETE FROM chat_members WHERE chat_id = ?1", params![chat_id])?;
        let affected = tx.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    fn add_chat_member(
        &self,
        chat_id: &str,
        profile_id: &str,
        join_time: u64,
    ) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO chat_members (chat_id, profile_id, join_time)
             VALUES (?1, ?2, ?3)",
            params![chat_id, profile_id, join_time as i64],
        )?;
        Ok(())
    }

    fn remove_chat_member(&self, chat_id: &str, profile_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn().execute(
            "DELETE FROM chat_members WHERE chat_id = ?1 AND profile_id = ?2",
            params![chat_id, profile_id],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    fn insert_group(&self, group: &Group) -> Result<(), StorageError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO groups (id, name, avatar, chat_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                group.id,
                group.name,
                group.avatar,
                group.chat_id,
                group.created_at as i64,
                group.updated_at as i64,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StorageError::AlreadyExists(format!("group {}", group.id))
            } else {
                StorageError::Sqlite(e)
            }
        })?;
        Self::write_members(&tx, group)?;
        tx.commit()?;
        Ok(())
    }

    fn get_group(&self, group_id: &str) -> Result<Option<Group>, StorageError> {
        Self::load_group(&self.conn(), group_id)
    }

    fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let affected = tx.execute(
            "UPDATE groups SET name = ?2, avatar = ?3, chat_id = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                group.id,
                group.name,
                group.avatar,
                group.chat_id,
                group.updated_at as i64,
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("group {}", group.id)));
        }
        Self::write_members(&tx, group)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_group(&self, group_id: &str) -> Result<bool, StorageError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1",
            params![group_id],
        )?;
        let affected = tx.execute("DELETE FROM groups WHERE id = ?1", params![group_id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    fn list_groups_for(&self, profile_id: &str) -> Result<Vec<Group>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT g.id FROM groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.profile_id = ?1 ORDER BY g.created_at, g.id",
        )?;
        let ids: Vec<String> = collect(stmt.query_map(params![profile_id], |row| row.get(0))?)?;
        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = Self::load_group(&conn, &id)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }
}

/// Location of the database file inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("rapport.db")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

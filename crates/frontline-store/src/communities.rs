//! Community hubs and their membership.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use tracing::debug;

use crate::sqlite::{clean, db_err, like_pattern, now_ms, unique_err, Filter, SqliteStore};
use crate::types::*;
use frontline_core::validate::require_non_empty;
use frontline_core::{Error, Result};

const COMMUNITY_SELECT: &str = "SELECT c.id, c.name, c.description, c.category, c.creator_id, \
     c.created_at, \
     (SELECT COUNT(*) FROM community_members m WHERE m.community_id = c.id) AS member_count \
     FROM communities c";

impl SqliteStore {
    /// Create a community; the creator becomes its first member.
    pub fn create_community(&self, creator_id: i64, new: &NewCommunity) -> Result<Community> {
        let name = require_non_empty("name", &new.name)?;
        let now = now_ms();

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO communities (name, description, category, creator_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                new.description.trim(),
                clean(new.category.as_deref()),
                creator_id,
                now
            ],
        )
        .map_err(unique_err("community name already taken"))?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO community_members (community_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![id, creator_id, now],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        drop(conn);

        debug!("User {} created community {} ({})", creator_id, id, name);
        self.get_community(id)?
            .ok_or_else(|| Error::Internal(format!("community {id} vanished after insert")))
    }

    pub fn get_community(&self, community_id: i64) -> Result<Option<Community>> {
        let conn = self.conn.lock();
        let sql = format!("{COMMUNITY_SELECT} WHERE c.id = ?1");
        let row = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params![community_id], |row| Ok(Self::row_to_community(row)))
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// List communities, largest first.
    pub fn list_communities(&self, filter: &CommunityFilter) -> Result<Paginated<Community>> {
        let mut f = Filter::default();
        if let Some(category) = clean(filter.category.as_deref()) {
            f.push("c.category = ? COLLATE NOCASE", category);
        }
        if let Some(q) = clean(filter.query.as_deref()) {
            f.push_repeated(
                "(c.name LIKE ? ESCAPE '\\' OR c.description LIKE ? ESCAPE '\\')",
                Value::Text(like_pattern(&q)),
            );
        }

        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM communities c{}", f.sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let sql = format!(
            "{COMMUNITY_SELECT}{} ORDER BY member_count DESC, c.created_at DESC LIMIT ? OFFSET ?",
            f.sql()
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(f.paged_params(filter.page)), |row| {
                Ok(Self::row_to_community(row))
            })
            .map_err(db_err)?;
        let items: Vec<Community> = rows.filter_map(|r| r.ok()).collect();

        Ok(Paginated::new(items, total, filter.page))
    }

    /// Add a member. Joining twice is `Conflict`.
    pub fn join_community(&self, community_id: i64, user_id: i64) -> Result<()> {
        if self.get_community(community_id)?.is_none() {
            return Err(Error::NotFound(format!("community {community_id}")));
        }
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO community_members (community_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![community_id, user_id, now_ms()],
        )
        .map_err(unique_err("already a member"))?;
        debug!("User {} joined community {}", user_id, community_id);
        Ok(())
    }

    /// Remove a member. Returns whether they were a member.
    pub fn leave_community(&self, community_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "DELETE FROM community_members WHERE community_id = ?1 AND user_id = ?2",
                params![community_id, user_id],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn is_member(&self, community_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM community_members WHERE community_id = ?1 AND user_id = ?2)",
            params![community_id, user_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    /// Members in join order.
    pub fn community_members(&self, community_id: i64) -> Result<Vec<Member>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT u.id, u.name, u.role, m.joined_at FROM community_members m \
                 JOIN users u ON u.id = m.user_id \
                 WHERE m.community_id = ?1 ORDER BY m.joined_at ASC, u.id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![community_id], |row| {
                Ok(Member {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    role: row
                        .get::<_, String>(2)?
                        .parse()
                        .unwrap_or_default(),
                    joined_at: row.get(3)?,
                })
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete a community. Its posts stay, detached from the hub.
    pub fn delete_community(&self, community_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM communities WHERE id = ?1", params![community_id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    fn row_to_community(row: &rusqlite::Row<'_>) -> Community {
        Community {
            id: row.get("id").unwrap_or(0),
            name: row.get("name").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            category: row.get("category").ok().flatten(),
            creator_id: row.get("creator_id").unwrap_or(0),
            member_count: row.get("member_count").unwrap_or(0),
            created_at: row.get("created_at").unwrap_or(0),
        }
    }
}

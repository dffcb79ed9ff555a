//! Buyer/seller connection requests. An accepted connection unlocks contact handoff.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::sqlite::{clean, db_err, now_ms, unique_err, SqliteStore};
use crate::types::*;
use frontline_core::{Error, Result};

const CONNECTION_COLUMNS: &str =
    "id, requester_id, recipient_id, message, status, created_at, updated_at";

impl SqliteStore {
    /// Ask `recipient_id` to connect. A pair may only have one connection, in either direction.
    pub fn create_connection(
        &self,
        requester_id: i64,
        recipient_id: i64,
        message: Option<&str>,
    ) -> Result<Connection> {
        if requester_id == recipient_id {
            return Err(Error::Validation("cannot connect with yourself".into()));
        }
        if self.get_user(recipient_id)?.is_none() {
            return Err(Error::NotFound(format!("user {recipient_id}")));
        }
        // Pair check and insert share one guard.
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM connections \
                 WHERE (requester_id = ?1 AND recipient_id = ?2) \
                    OR (requester_id = ?2 AND recipient_id = ?1))",
                params![requester_id, recipient_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if exists {
            return Err(Error::Conflict("connection already exists".into()));
        }
        let id = conn
            .prepare_cached(
                "INSERT INTO connections (requester_id, recipient_id, message, status, created_at) \
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
            )
            .map_err(db_err)?
            .insert(params![requester_id, recipient_id, clean(message), now_ms()])
            .map_err(unique_err("connection already exists"))?;
        drop(conn);

        debug!("User {} requested connection {} with {}", requester_id, id, recipient_id);
        self.get_connection(id)?
            .ok_or_else(|| Error::Internal(format!("connection {id} vanished after insert")))
    }

    pub fn get_connection(&self, connection_id: i64) -> Result<Option<Connection>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = ?1");
        let row = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params![connection_id], |row| Ok(Self::row_to_connection(row)))
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// The connection between two users regardless of who asked.
    pub fn connection_between(&self, a: i64, b: i64) -> Result<Option<Connection>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections \
             WHERE (requester_id = ?1 AND recipient_id = ?2) \
                OR (requester_id = ?2 AND recipient_id = ?1)"
        );
        let row = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params![a, b], |row| Ok(Self::row_to_connection(row)))
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// Accept or decline a pending request. Only the recipient may respond.
    pub fn respond_connection(
        &self,
        connection_id: i64,
        recipient_id: i64,
        accept: bool,
    ) -> Result<Connection> {
        let existing = self
            .get_connection(connection_id)?
            .ok_or_else(|| Error::NotFound(format!("connection {connection_id}")))?;
        if existing.recipient_id != recipient_id {
            return Err(Error::Forbidden(
                "only the recipient can respond to a connection request".into(),
            ));
        }
        if existing.status != ConnectionStatus::Pending {
            return Err(Error::Conflict(format!(
                "connection already {}",
                existing.status.as_str()
            )));
        }

        let status = if accept {
            ConnectionStatus::Accepted
        } else {
            ConnectionStatus::Declined
        };
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE connections SET status = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = 'pending'",
                params![status.as_str(), now_ms(), connection_id],
            )
            .map_err(db_err)?;
        drop(conn);
        if count == 0 {
            return Err(Error::Conflict("connection was already answered".into()));
        }

        debug!("Connection {} {}", connection_id, status.as_str());
        self.get_connection(connection_id)?
            .ok_or_else(|| Error::NotFound(format!("connection {connection_id}")))
    }

    /// Connections a user takes part in, optionally filtered by status.
    pub fn list_connections(
        &self,
        user_id: i64,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<Connection>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections \
             WHERE (requester_id = ?1 OR recipient_id = ?1) \
               AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id, status.map(|s| s.as_str())], |row| {
                Ok(Self::row_to_connection(row))
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn delete_connection(&self, connection_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM connections WHERE id = ?1", params![connection_id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Whether two users may see each other's contact details.
    pub fn are_connected(&self, a: i64, b: i64) -> Result<bool> {
        Ok(self
            .connection_between(a, b)?
            .is_some_and(|c| c.status == ConnectionStatus::Accepted))
    }

    fn row_to_connection(row: &rusqlite::Row<'_>) -> Connection {
        Connection {
            id: row.get("id").unwrap_or(0),
            requester_id: row.get("requester_id").unwrap_or(0),
            recipient_id: row.get("recipient_id").unwrap_or(0),
            message: row.get("message").ok().flatten(),
            status: row
                .get::<_, String>("status")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(ConnectionStatus::Pending),
            created_at: row.get("created_at").unwrap_or(0),
            updated_at: row.get("updated_at").ok().flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::sqlite::tests::{add_user, test_store};
    use crate::types::*;
    use frontline_core::Error;

    #[test]
    fn test_request_and_accept() {
        let (store, _dir) = test_store();
        let buyer = add_user(&store, "Buyer", Role::Buyer);
        let seller = add_user(&store, "Seller", Role::Seller);

        let c = store
            .create_connection(buyer, seller, Some("Interested in your catering"))
            .unwrap();
        assert_eq!(c.status, ConnectionStatus::Pending);
        assert!(!store.are_connected(buyer, seller).unwrap());

        assert!(matches!(
            store.respond_connection(c.id, buyer, true),
            Err(Error::Forbidden(_))
        ));
        let accepted = store.respond_connection(c.id, seller, true).unwrap();
        assert_eq!(accepted.status, ConnectionStatus::Accepted);
        assert!(accepted.updated_at.is_some());
        assert!(store.are_connected(seller, buyer).unwrap());

        assert!(matches!(
            store.respond_connection(c.id, seller, false),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_connection_rules() {
        let (store, _dir) = test_store();
        let buyer = add_user(&store, "Buyer", Role::Buyer);
        let seller = add_user(&store, "Seller", Role::Seller);

        assert!(matches!(
            store.create_connection(buyer, buyer, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.create_connection(buyer, 5150, None),
            Err(Error::NotFound(_))
        ));

        store.create_connection(buyer, seller, None).unwrap();
        // Reverse direction counts as the same pair.
        assert!(matches!(
            store.create_connection(seller, buyer, None),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_list_and_delete() {
        let (store, _dir) = test_store();
        let buyer = add_user(&store, "Buyer", Role::Buyer);
        let s1 = add_user(&store, "SellerOne", Role::Seller);
        let s2 = add_user(&store, "SellerTwo", Role::Seller);

        let c1 = store.create_connection(buyer, s1, None).unwrap();
        let c2 = store.create_connection(buyer, s2, None).unwrap();
        store.respond_connection(c2.id, s2, false).unwrap();

        assert_eq!(store.list_connections(buyer, None).unwrap().len(), 2);
        let pending = store
            .list_connections(buyer, Some(ConnectionStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, c1.id);
        assert_eq!(store.list_connections(s1, None).unwrap().len(), 1);

        assert!(store.delete_connection(c1.id).unwrap());
        assert!(store.get_connection(c1.id).unwrap().is_none());
        assert!(!store.delete_connection(c1.id).unwrap());
    }

    #[test]
    fn test_crossing_requests_keep_one_connection() {
        let (store, _dir) = test_store();
        let a = add_user(&store, "Akosua", Role::Buyer);
        let b = add_user(&store, "Yaw", Role::Seller);
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [(a, b), (b, a)]
            .into_iter()
            .map(|(from, to)| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.create_connection(from, to, None)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::Conflict(_)))));
        assert_eq!(store.list_connections(a, None).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_responses_have_one_winner() {
        let (store, _dir) = test_store();
        let buyer = add_user(&store, "Buyer", Role::Buyer);
        let seller = add_user(&store, "Seller", Role::Seller);
        let c = store.create_connection(buyer, seller, None).unwrap();
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [true, false]
            .into_iter()
            .map(|accept| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.respond_connection(c.id, seller, accept)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let stored = store.get_connection(c.id).unwrap().unwrap();
        assert_eq!(stored.status, winners[0].status);
    }
}

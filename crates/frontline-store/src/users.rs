//! Users, bearer sessions and ratings.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use tracing::debug;

use crate::sqlite::{clean, db_err, like_pattern, now_ms, unique_err, Filter, SqliteStore};
use crate::types::*;
use frontline_core::{next_average, Error, Result, TrustInputs};

const USER_COLUMNS: &str = "id, name, email, phone, bio, location, avatar_url, role, \
                            skills_json, average_rating, rating_count, created_at, updated_at";

impl SqliteStore {
    // ---------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------

    /// Insert a user. Duplicate emails are `Conflict`.
    pub fn create_user(&self, user: NewUser) -> Result<User> {
        let now = now_ms();
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO users (name, email, password_hash, phone, role, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(db_err)?
            .insert(params![
                user.name.trim(),
                user.email,
                user.password_hash,
                user.phone,
                user.role.as_str(),
                now
            ])
            .map_err(unique_err("email already registered"))?;
        drop(conn);
        debug!("Created user {} ({})", id, user.role);

        self.get_user(id)?
            .ok_or_else(|| Error::Internal(format!("user {id} vanished after insert")))
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let row = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params![user_id], |row| Ok(Self::row_to_user(row)))
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        let row = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params![email], |row| Ok(Self::row_to_user(row)))
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// Login material for an email address.
    pub fn credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT id, password_hash FROM users WHERE email = ?1")
            .map_err(db_err)?
            .query_row(params![email], |row| {
                Ok(Credentials {
                    user_id: row.get(0)?,
                    password_hash: row.get(1)?,
                })
            })
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// Apply a partial profile update. Returns `None` if the user does not exist.
    ///
    /// An empty string clears `phone`, `bio`, `location` or `avatar_url`.
    pub fn update_user(&self, user_id: i64, update: &UserUpdate) -> Result<Option<User>> {
        let skills_json = update
            .skills
            .as_ref()
            .map(|skills| {
                let cleaned: Vec<&str> = skills
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect();
                serde_json::to_string(&cleaned)
            })
            .transpose()?;

        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE users SET \
                 name = COALESCE(?1, name), \
                 phone = CASE WHEN ?2 IS NULL THEN phone ELSE NULLIF(?2, '') END, \
                 bio = CASE WHEN ?3 IS NULL THEN bio ELSE NULLIF(?3, '') END, \
                 location = CASE WHEN ?4 IS NULL THEN location ELSE NULLIF(?4, '') END, \
                 avatar_url = CASE WHEN ?5 IS NULL THEN avatar_url ELSE NULLIF(?5, '') END, \
                 role = COALESCE(?6, role), \
                 skills_json = COALESCE(?7, skills_json), \
                 updated_at = ?8 \
                 WHERE id = ?9",
                params![
                    clean(update.name.as_deref()),
                    update.phone.as_deref().map(str::trim),
                    update.bio.as_deref().map(str::trim),
                    update.location.as_deref().map(str::trim),
                    update.avatar_url.as_deref().map(str::trim),
                    update.role.map(|r| r.as_str()),
                    skills_json,
                    now_ms(),
                    user_id
                ],
            )
            .map_err(db_err)?;
        drop(conn);

        if count == 0 {
            return Ok(None);
        }
        self.get_user(user_id)
    }

    /// Delete a user and everything they own (cascade).
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// List users, newest first, with optional filters.
    pub fn list_users(&self, filter: &UserFilter) -> Result<Paginated<User>> {
        let mut f = Filter::default();
        if let Some(role) = filter.role {
            f.push("role = ?", role.as_str().to_string());
        }
        if let Some(skill) = clean(filter.skill.as_deref()) {
            f.push("skills_json LIKE ? ESCAPE '\\'", like_pattern(&skill));
        }
        if let Some(location) = clean(filter.location.as_deref()) {
            f.push("location LIKE ? ESCAPE '\\'", like_pattern(&location));
        }
        if let Some(q) = clean(filter.query.as_deref()) {
            f.push_repeated(
                "(name LIKE ? ESCAPE '\\' OR bio LIKE ? ESCAPE '\\')",
                Value::Text(like_pattern(&q)),
            );
        }

        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM users{}", f.sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            f.sql()
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(f.paged_params(filter.page)), |row| {
                Ok(Self::row_to_user(row))
            })
            .map_err(db_err)?;
        let users: Vec<User> = rows.filter_map(|r| r.ok()).collect();

        Ok(Paginated::new(users, total, filter.page))
    }

    pub fn count_posts_by_author(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    pub fn count_communities_for_user(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM community_members WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    /// Gather the inputs of a user's trust score. `None` if the user does not exist.
    pub fn trust_inputs(&self, user_id: i64) -> Result<Option<TrustInputs>> {
        let Some(user) = self.get_user(user_id)? else {
            return Ok(None);
        };
        Ok(Some(TrustInputs {
            post_count: self.count_posts_by_author(user_id)?,
            community_count: self.count_communities_for_user(user_id)?,
            average_rating: user.average_rating,
        }))
    }

    // ---------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------

    /// Store a hashed bearer token. Returns its expiry (ms since epoch).
    pub fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        ttl: chrono::Duration,
    ) -> Result<i64> {
        let now = now_ms();
        let expires_at = now + ttl.num_milliseconds();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, now, expires_at],
        )
        .map_err(unique_err("session token collision"))?;
        Ok(expires_at)
    }

    /// Resolve a token hash to its user. Expired sessions are removed and yield `None`.
    pub fn session_user(&self, token_hash: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let session: Option<(i64, i64)> = conn
            .prepare_cached("SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1")
            .map_err(db_err)?
            .query_row(params![token_hash], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(db_err)?;

        let Some((user_id, expires_at)) = session else {
            return Ok(None);
        };
        if expires_at <= now_ms() {
            conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )
            .map_err(db_err)?;
            debug!("Dropped expired session for user {}", user_id);
            return Ok(None);
        }
        drop(conn);
        self.get_user(user_id)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now_ms()])
            .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Ratings
    // ---------------------------------------------------------------

    /// Record a rating and fold it into the target's running average.
    ///
    /// Returns the updated target. One rating per rater/target pair.
    pub fn add_rating(
        &self,
        rater_id: i64,
        target_id: i64,
        stars: u8,
        comment: Option<&str>,
    ) -> Result<User> {
        if rater_id == target_id {
            return Err(Error::Validation("users cannot rate themselves".into()));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let current: Option<(f64, i64)> = tx
            .query_row(
                "SELECT average_rating, rating_count FROM users WHERE id = ?1",
                params![target_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let (avg, count) =
            current.ok_or_else(|| Error::NotFound(format!("user {target_id}")))?;

        let now = now_ms();
        tx.execute(
            "INSERT INTO ratings (rater_id, target_id, stars, comment, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![rater_id, target_id, stars, clean(comment), now],
        )
        .map_err(unique_err("user already rated"))?;

        let new_avg = next_average(avg, count, stars);
        tx.execute(
            "UPDATE users SET average_rating = ?1, rating_count = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![new_avg, count + 1, now, target_id],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        drop(conn);

        debug!(
            "User {} rated {} ({} stars), average now {:.2}",
            rater_id, target_id, stars, new_avg
        );
        self.get_user(target_id)?
            .ok_or_else(|| Error::NotFound(format!("user {target_id}")))
    }

    /// Ratings received by a user, newest first.
    pub fn ratings_for_user(&self, target_id: i64) -> Result<Vec<Rating>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, rater_id, target_id, stars, comment, created_at FROM ratings \
                 WHERE target_id = ?1 ORDER BY created_at DESC, id DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![target_id], |row| {
                Ok(Rating {
                    id: row.get(0)?,
                    rater_id: row.get(1)?,
                    target_id: row.get(2)?,
                    stars: row.get(3)?,
                    comment: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> User {
        User {
            id: row.get("id").unwrap_or(0),
            name: row.get("name").unwrap_or_default(),
            email: row.get("email").unwrap_or_default(),
            phone: row.get("phone").ok().flatten(),
            bio: row.get("bio").ok().flatten(),
            location: row.get("location").ok().flatten(),
            avatar_url: row.get("avatar_url").ok().flatten(),
            role: row
                .get::<_, String>("role")
                .ok()
                .and_then(|r| r.parse().ok())
                .unwrap_or_default(),
            skills: row
                .get::<_, String>("skills_json")
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            average_rating: row.get("average_rating").unwrap_or(0.0),
            rating_count: row.get("rating_count").unwrap_or(0),
            created_at: row.get("created_at").unwrap_or(0),
            updated_at: row.get("updated_at").ok().flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sqlite::tests::{add_user, test_store};
    use crate::types::*;
    use frontline_core::Error;

    #[test]
    fn test_create_and_get_user() {
        let (store, _dir) = test_store();
        let id = add_user(&store, "Ama", Role::Seller);

        let user = store.get_user(id).unwrap().unwrap();
        assert_eq!(user.name, "Ama");
        assert_eq!(user.email, "ama@example.com");
        assert_eq!(user.role, Role::Seller);
        assert_eq!(user.rating_count, 0);
        assert!(user.skills.is_empty());
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let (store, _dir) = test_store();
        add_user(&store, "Ama", Role::Seller);
        let result = store.create_user(NewUser {
            name: "Other Ama".into(),
            email: "ama@example.com".into(),
            password_hash: "x".into(),
            phone: None,
            role: Role::Buyer,
        });
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_empty_string_clears_optional_fields() {
        let (store, _dir) = test_store();
        let id = add_user(&store, "Efua", Role::Seller);
        store
            .update_user(
                id,
                &UserUpdate {
                    bio: Some("Seamstress".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let cleared = store
            .update_user(
                id,
                &UserUpdate {
                    phone: Some(String::new()),
                    bio: Some("  ".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(cleared.phone.is_none());
        assert!(cleared.bio.is_none());
        assert_eq!(cleared.name, "Efua");
    }

    #[test]
    fn test_credentials_lookup() {
        let (store, _dir) = test_store();
        let id = add_user(&store, "Kojo", Role::Buyer);
        let creds = store.credentials_by_email("kojo@example.com").unwrap().unwrap();
        assert_eq!(creds.user_id, id);
        assert_eq!(creds.password_hash, "hash");
        assert!(store.credentials_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_partial_update() {
        let (store, _dir) = test_store();
        let id = add_user(&store, "Esi", Role::Buyer);

        let updated = store
            .update_user(
                id,
                &UserUpdate {
                    bio: Some("Tailor in Kumasi".into()),
                    role: Some(Role::Seller),
                    skills: Some(vec!["sewing".into(), " ".into(), "kente".into()]),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Esi");
        assert_eq!(updated.bio.as_deref(), Some("Tailor in Kumasi"));
        assert_eq!(updated.role, Role::Seller);
        assert_eq!(updated.skills, vec!["sewing", "kente"]);
        assert!(updated.updated_at.is_some());

        assert!(store.update_user(9999, &UserUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn test_list_users_filters() {
        let (store, _dir) = test_store();
        let ama = add_user(&store, "Ama", Role::Seller);
        add_user(&store, "Yaw", Role::Buyer);
        store
            .update_user(
                ama,
                &UserUpdate {
                    skills: Some(vec!["Photography".into()]),
                    location: Some("Accra".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let sellers = store
            .list_users(&UserFilter {
                role: Some(Role::Seller),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sellers.total, 1);
        assert_eq!(sellers.items[0].id, ama);

        let by_skill = store
            .list_users(&UserFilter {
                skill: Some("photo".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_skill.total, 1);

        let by_location = store
            .list_users(&UserFilter {
                location: Some("kumasi".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_location.total, 0);

        let all = store.list_users(&UserFilter::default()).unwrap();
        assert_eq!(all.total, 2);
    }

    #[test]
    fn test_rating_updates_running_average() {
        let (store, _dir) = test_store();
        let seller = add_user(&store, "Seller", Role::Seller);
        let b1 = add_user(&store, "Buyer1", Role::Buyer);
        let b2 = add_user(&store, "Buyer2", Role::Buyer);

        let after_first = store.add_rating(b1, seller, 5, Some("Great work")).unwrap();
        assert_eq!(after_first.rating_count, 1);
        assert!((after_first.average_rating - 5.0).abs() < 1e-9);

        let after_second = store.add_rating(b2, seller, 2, None).unwrap();
        assert_eq!(after_second.rating_count, 2);
        assert!((after_second.average_rating - 3.5).abs() < 1e-9);

        let ratings = store.ratings_for_user(seller).unwrap();
        assert_eq!(ratings.len(), 2);
        assert!(ratings.iter().any(|r| r.comment.as_deref() == Some("Great work")));
    }

    #[test]
    fn test_rating_rules() {
        let (store, _dir) = test_store();
        let seller = add_user(&store, "Seller", Role::Seller);
        let buyer = add_user(&store, "Buyer", Role::Buyer);

        assert!(matches!(
            store.add_rating(seller, seller, 5, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.add_rating(buyer, 4242, 5, None),
            Err(Error::NotFound(_))
        ));

        store.add_rating(buyer, seller, 4, None).unwrap();
        assert!(matches!(
            store.add_rating(buyer, seller, 1, None),
            Err(Error::Conflict(_))
        ));
        // Rejected duplicate must not touch the average.
        let user = store.get_user(seller).unwrap().unwrap();
        assert_eq!(user.rating_count, 1);
        assert!((user.average_rating - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_sessions_expire() {
        let (store, _dir) = test_store();
        let id = add_user(&store, "Kwame", Role::Buyer);

        store
            .create_session(id, "live", chrono::Duration::hours(1))
            .unwrap();
        store
            .create_session(id, "stale", chrono::Duration::milliseconds(-1))
            .unwrap();

        assert_eq!(store.session_user("live").unwrap().unwrap().id, id);
        assert!(store.session_user("stale").unwrap().is_none());
        assert!(store.session_user("unknown").unwrap().is_none());
        // The stale row was removed on lookup.
        assert_eq!(store.purge_expired_sessions().unwrap(), 0);

        assert!(store.delete_session("live").unwrap());
        assert!(store.session_user("live").unwrap().is_none());
    }

    #[test]
    fn test_delete_user_cascades_sessions() {
        let (store, _dir) = test_store();
        let id = add_user(&store, "Adjoa", Role::Buyer);
        store
            .create_session(id, "tok", chrono::Duration::hours(1))
            .unwrap();

        assert!(store.delete_user(id).unwrap());
        assert!(store.get_user(id).unwrap().is_none());
        assert!(!store.delete_session("tok").unwrap());
        assert!(!store.delete_user(id).unwrap());
    }

    #[test]
    fn test_trust_inputs() {
        let (store, _dir) = test_store();
        let id = add_user(&store, "Abena", Role::Seller);
        let inputs = store.trust_inputs(id).unwrap().unwrap();
        assert_eq!(inputs.post_count, 0);
        assert_eq!(inputs.community_count, 0);
        assert!(store.trust_inputs(777).unwrap().is_none());
    }
}

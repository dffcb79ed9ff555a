//! Marketplace listings with FTS5 search.

use rusqlite::{params, params_from_iter, OptionalExtension};
use tracing::debug;

use crate::sqlite::{clean, db_err, now_ms, Filter, SqliteStore};
use crate::types::*;
use frontline_core::validate::{require_non_empty, validate_price};
use frontline_core::{Error, Result};

const POST_SELECT: &str = "SELECT p.id, p.author_id, u.name AS author_name, p.community_id, \
     p.title, p.body, p.category, p.price, p.image_url, p.created_at, p.updated_at \
     FROM posts p JOIN users u ON u.id = p.author_id";

impl SqliteStore {
    /// Publish a listing. Posting into a community requires membership.
    pub fn create_post(&self, author_id: i64, new: &NewPost) -> Result<Post> {
        let title = require_non_empty("title", &new.title)?;
        let price = new.price.map(validate_price).transpose()?;

        if let Some(community_id) = new.community_id {
            if self.get_community(community_id)?.is_none() {
                return Err(Error::NotFound(format!("community {community_id}")));
            }
            if !self.is_member(community_id, author_id)? {
                return Err(Error::Forbidden(
                    "join the community before posting in it".into(),
                ));
            }
        }

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO posts (author_id, community_id, title, body, category, price, \
                 image_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(db_err)?
            .insert(params![
                author_id,
                new.community_id,
                title,
                new.body.trim(),
                clean(new.category.as_deref()),
                price,
                clean(new.image_url.as_deref()),
                now_ms()
            ])
            .map_err(db_err)?;
        drop(conn);

        debug!("User {} published post {}", author_id, id);
        self.get_post(id)?
            .ok_or_else(|| Error::Internal(format!("post {id} vanished after insert")))
    }

    pub fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let conn = self.conn.lock();
        let sql = format!("{POST_SELECT} WHERE p.id = ?1");
        let row = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params![post_id], |row| Ok(Self::row_to_post(row)))
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// Apply a partial update. Returns `None` if the post does not exist.
    pub fn update_post(&self, post_id: i64, update: &PostUpdate) -> Result<Option<Post>> {
        let title = update
            .title
            .as_deref()
            .map(|t| require_non_empty("title", t).map(String::from))
            .transpose()?;
        let price = update.price.map(validate_price).transpose()?;

        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE posts SET \
                 title = COALESCE(?1, title), \
                 body = COALESCE(?2, body), \
                 category = COALESCE(?3, category), \
                 price = COALESCE(?4, price), \
                 image_url = COALESCE(?5, image_url), \
                 updated_at = ?6 \
                 WHERE id = ?7",
                params![
                    title,
                    update.body.as_deref().map(str::trim),
                    clean(update.category.as_deref()),
                    price,
                    clean(update.image_url.as_deref()),
                    now_ms(),
                    post_id
                ],
            )
            .map_err(db_err)?;
        drop(conn);

        if count == 0 {
            return Ok(None);
        }
        self.get_post(post_id)
    }

    pub fn delete_post(&self, post_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM posts WHERE id = ?1", params![post_id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Feed of listings, newest first.
    pub fn list_posts(&self, filter: &PostFilter) -> Result<Paginated<Post>> {
        let mut f = Filter::default();
        if let Some(author_id) = filter.author_id {
            f.push("p.author_id = ?", author_id);
        }
        if let Some(community_id) = filter.community_id {
            f.push("p.community_id = ?", community_id);
        }
        if let Some(category) = clean(filter.category.as_deref()) {
            f.push("p.category = ? COLLATE NOCASE", category);
        }
        if let Some(min) = filter.min_price {
            f.push("p.price >= ?", min);
        }
        if let Some(max) = filter.max_price {
            f.push("p.price <= ?", max);
        }

        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM posts p{}", f.sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let sql = format!(
            "{POST_SELECT}{} ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            f.sql()
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(f.paged_params(filter.page)), |row| {
                Ok(Self::row_to_post(row))
            })
            .map_err(db_err)?;
        let items: Vec<Post> = rows.filter_map(|r| r.ok()).collect();

        Ok(Paginated::new(items, total, filter.page))
    }

    /// Full-text search over title and body, best match first.
    pub fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<Post>> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let sql = "SELECT p.id, p.author_id, u.name AS author_name, p.community_id, \
                   p.title, p.body, p.category, p.price, p.image_url, p.created_at, p.updated_at \
                   FROM posts_fts \
                   JOIN posts p ON p.id = posts_fts.rowid \
                   JOIN users u ON u.id = p.author_id \
                   WHERE posts_fts MATCH ?1 \
                   ORDER BY posts_fts.rank \
                   LIMIT ?2";
        let mut stmt = conn.prepare_cached(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok(Self::row_to_post(row))
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Quote every token and prefix-match the last one, so partial typing still hits.
    fn sanitize_fts_query(query: &str) -> String {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.replace('"', ""))
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"", t))
            .collect();
        match tokens.split_last() {
            Some((last, rest)) if rest.is_empty() => format!("{last}*"),
            Some((last, rest)) => format!("{} {last}*", rest.join(" ")),
            None => String::new(),
        }
    }

    fn row_to_post(row: &rusqlite::Row<'_>) -> Post {
        Post {
            id: row.get("id").unwrap_or(0),
            author_id: row.get("author_id").unwrap_or(0),
            author_name: row.get("author_name").unwrap_or_default(),
            community_id: row.get("community_id").ok().flatten(),
            title: row.get("title").unwrap_or_default(),
            body: row.get("body").unwrap_or_default(),
            category: row.get("category").ok().flatten(),
            price: row.get("price").ok().flatten(),
            image_url: row.get("image_url").ok().flatten(),
            created_at: row.get("created_at").unwrap_or(0),
            updated_at: row.get("updated_at").ok().flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sqlite::tests::{add_user, test_store};
    use crate::sqlite::SqliteStore;
    use crate::types::*;
    use frontline_core::Error;

    fn listing(title: &str, body: &str, price: Option<f64>) -> NewPost {
        NewPost {
            title: title.into(),
            body: body.into(),
            community_id: None,
            category: Some("design".into()),
            price,
            image_url: None,
        }
    }

    #[test]
    fn test_create_and_get_post() {
        let (store, _dir) = test_store();
        let ama = add_user(&store, "Ama", Role::Seller);

        let post = store
            .create_post(ama, &listing("Logo design", "Brand identity kits", Some(150.0)))
            .unwrap();
        let fetched = store.get_post(post.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Logo design");
        assert_eq!(fetched.author_name, "Ama");
        assert_eq!(fetched.price, Some(150.0));
        assert_eq!(store.count_posts_by_author(ama).unwrap(), 1);
    }

    #[test]
    fn test_create_post_validation() {
        let (store, _dir) = test_store();
        let ama = add_user(&store, "Ama", Role::Seller);

        assert!(matches!(
            store.create_post(ama, &listing("  ", "", None)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.create_post(ama, &listing("Cheap", "", Some(-5.0))),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_community_post_requires_membership() {
        let (store, _dir) = test_store();
        let ama = add_user(&store, "Ama", Role::Seller);
        let yaw = add_user(&store, "Yaw", Role::Seller);
        let c = store
            .create_community(
                ama,
                &NewCommunity {
                    name: "Designers".into(),
                    description: String::new(),
                    category: None,
                },
            )
            .unwrap();

        let mut new = listing("Flyers", "Event flyers", None);
        new.community_id = Some(c.id);
        assert!(matches!(
            store.create_post(yaw, &new),
            Err(Error::Forbidden(_))
        ));
        store.join_community(c.id, yaw).unwrap();
        let post = store.create_post(yaw, &new).unwrap();
        assert_eq!(post.community_id, Some(c.id));

        new.community_id = Some(404);
        assert!(matches!(store.create_post(yaw, &new), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_update_and_delete_post() {
        let (store, _dir) = test_store();
        let ama = add_user(&store, "Ama", Role::Seller);
        let post = store
            .create_post(ama, &listing("Vintage title", "first draft", Some(10.0)))
            .unwrap();

        let updated = store
            .update_post(
                post.id,
                &PostUpdate {
                    title: Some("New title".into()),
                    price: Some(12.5),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "New title");
        assert_eq!(updated.body, "first draft");
        assert_eq!(updated.price, Some(12.5));

        // FTS index follows the update.
        assert!(store.search_posts("vintage", 10).unwrap().is_empty());
        assert_eq!(store.search_posts("new", 10).unwrap().len(), 1);

        assert!(store.delete_post(post.id).unwrap());
        assert!(store.get_post(post.id).unwrap().is_none());
        assert!(store.search_posts("new", 10).unwrap().is_empty());
        assert!(store.update_post(post.id, &PostUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn test_list_posts_filters() {
        let (store, _dir) = test_store();
        let ama = add_user(&store, "Ama", Role::Seller);
        let kofi = add_user(&store, "Kofi", Role::Seller);
        store.create_post(ama, &listing("A", "", Some(10.0))).unwrap();
        store.create_post(ama, &listing("B", "", Some(50.0))).unwrap();
        let c = store.create_post(kofi, &listing("C", "", None)).unwrap();

        let all = store.list_posts(&PostFilter::default()).unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.items[0].id, c.id);

        let by_author = store
            .list_posts(&PostFilter {
                author_id: Some(ama),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_author.total, 2);

        let priced = store
            .list_posts(&PostFilter {
                min_price: Some(20.0),
                max_price: Some(100.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(priced.total, 1);
        assert_eq!(priced.items[0].title, "B");

        let paged = store
            .list_posts(&PostFilter {
                page: Page::new(Some(2), Some(2)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.total_pages, 2);
    }

    #[test]
    fn test_search_posts() {
        let (store, _dir) = test_store();
        let ama = add_user(&store, "Ama", Role::Seller);
        store
            .create_post(ama, &listing("Wedding photography", "Full day coverage in Accra", None))
            .unwrap();
        store
            .create_post(ama, &listing("Plumbing repairs", "Leaks and fittings", None))
            .unwrap();

        let hits = store.search_posts("photo", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].title.contains("photography"));

        let hits = store.search_posts("accra coverage", 10).unwrap();
        assert_eq!(hits.len(), 1);

        assert!(store.search_posts("\"\" ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_fts_query() {
        assert_eq!(SqliteStore::sanitize_fts_query("  "), "");
        assert_eq!(SqliteStore::sanitize_fts_query("logo"), "\"logo\"*");
        assert_eq!(
            SqliteStore::sanitize_fts_query("red \"logo\" des"),
            "\"red\" \"logo\" \"des\"*"
        );
    }
}

//! Courses and enrollments.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use tracing::debug;

use crate::sqlite::{clean, db_err, like_pattern, now_ms, unique_err, Filter, SqliteStore};
use crate::types::*;
use frontline_core::validate::{require_non_empty, validate_price};
use frontline_core::{Error, Result};

const COURSE_SELECT: &str = "SELECT c.id, c.instructor_id, u.name AS instructor_name, c.title, \
     c.description, c.price, c.duration_hours, c.level, c.created_at, c.updated_at, \
     (SELECT COUNT(*) FROM course_enrollments e WHERE e.course_id = c.id) AS enrollment_count \
     FROM courses c JOIN users u ON u.id = c.instructor_id";

fn validate_duration(hours: Option<f64>) -> Result<Option<f64>> {
    match hours {
        Some(h) if !h.is_finite() || h <= 0.0 => Err(Error::Validation(
            "duration must be a positive number of hours".into(),
        )),
        other => Ok(other),
    }
}

impl SqliteStore {
    pub fn create_course(&self, instructor_id: i64, new: &NewCourse) -> Result<Course> {
        let title = require_non_empty("title", &new.title)?;
        let price = validate_price(new.price)?;
        let duration = validate_duration(new.duration_hours)?;

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO courses (instructor_id, title, description, price, duration_hours, \
                 level, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(db_err)?
            .insert(params![
                instructor_id,
                title,
                new.description.trim(),
                price,
                duration,
                clean(new.level.as_deref()),
                now_ms()
            ])
            .map_err(db_err)?;
        drop(conn);

        debug!("User {} created course {}", instructor_id, id);
        self.get_course(id)?
            .ok_or_else(|| Error::Internal(format!("course {id} vanished after insert")))
    }

    pub fn get_course(&self, course_id: i64) -> Result<Option<Course>> {
        let conn = self.conn.lock();
        let sql = format!("{COURSE_SELECT} WHERE c.id = ?1");
        let row = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params![course_id], |row| Ok(Self::row_to_course(row)))
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    pub fn update_course(&self, course_id: i64, update: &CourseUpdate) -> Result<Option<Course>> {
        let title = update
            .title
            .as_deref()
            .map(|t| require_non_empty("title", t).map(String::from))
            .transpose()?;
        let price = update.price.map(validate_price).transpose()?;
        let duration = validate_duration(update.duration_hours)?;

        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE courses SET \
                 title = COALESCE(?1, title), \
                 description = COALESCE(?2, description), \
                 price = COALESCE(?3, price), \
                 duration_hours = COALESCE(?4, duration_hours), \
                 level = COALESCE(?5, level), \
                 updated_at = ?6 \
                 WHERE id = ?7",
                params![
                    title,
                    update.description.as_deref().map(str::trim),
                    price,
                    duration,
                    clean(update.level.as_deref()),
                    now_ms(),
                    course_id
                ],
            )
            .map_err(db_err)?;
        drop(conn);

        if count == 0 {
            return Ok(None);
        }
        self.get_course(course_id)
    }

    pub fn delete_course(&self, course_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM courses WHERE id = ?1", params![course_id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn list_courses(&self, filter: &CourseFilter) -> Result<Paginated<Course>> {
        let mut f = Filter::default();
        if let Some(instructor_id) = filter.instructor_id {
            f.push("c.instructor_id = ?", instructor_id);
        }
        if let Some(level) = clean(filter.level.as_deref()) {
            f.push("c.level = ? COLLATE NOCASE", level);
        }
        if let Some(q) = clean(filter.query.as_deref()) {
            f.push_repeated(
                "(c.title LIKE ? ESCAPE '\\' OR c.description LIKE ? ESCAPE '\\')",
                Value::Text(like_pattern(&q)),
            );
        }

        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM courses c{}", f.sql()),
                params_from_iter(f.params()),
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let sql = format!(
            "{COURSE_SELECT}{} ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            f.sql()
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(f.paged_params(filter.page)), |row| {
                Ok(Self::row_to_course(row))
            })
            .map_err(db_err)?;
        let items: Vec<Course> = rows.filter_map(|r| r.ok()).collect();

        Ok(Paginated::new(items, total, filter.page))
    }

    /// Enroll a user. Instructors cannot enroll in their own course.
    pub fn enroll(&self, course_id: i64, user_id: i64) -> Result<Course> {
        let course = self
            .get_course(course_id)?
            .ok_or_else(|| Error::NotFound(format!("course {course_id}")))?;
        if course.instructor_id == user_id {
            return Err(Error::Validation(
                "instructors cannot enroll in their own course".into(),
            ));
        }

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO course_enrollments (course_id, user_id, enrolled_at) VALUES (?1, ?2, ?3)",
            params![course_id, user_id, now_ms()],
        )
        .map_err(unique_err("already enrolled"))?;
        drop(conn);

        debug!("User {} enrolled in course {}", user_id, course_id);
        self.get_course(course_id)?
            .ok_or_else(|| Error::NotFound(format!("course {course_id}")))
    }

    /// Courses a user is enrolled in, most recent enrollment first.
    pub fn enrollments_for_user(&self, user_id: i64) -> Result<Vec<Course>> {
        let conn = self.conn.lock();
        let sql = format!(
            "{COURSE_SELECT} JOIN course_enrollments me ON me.course_id = c.id \
             WHERE me.user_id = ?1 ORDER BY me.enrolled_at DESC, c.id DESC"
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| Ok(Self::row_to_course(row)))
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn row_to_course(row: &rusqlite::Row<'_>) -> Course {
        Course {
            id: row.get("id").unwrap_or(0),
            instructor_id: row.get("instructor_id").unwrap_or(0),
            instructor_name: row.get("instructor_name").unwrap_or_default(),
            title: row.get("title").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            price: row.get("price").unwrap_or(0.0),
            duration_hours: row.get("duration_hours").ok().flatten(),
            level: row.get("level").ok().flatten(),
            enrollment_count: row.get("enrollment_count").unwrap_or(0),
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

    fn course(title: &str, level: &str) -> NewCourse {
        NewCourse {
            title: title.into(),
            description: "Hands-on sessions".into(),
            price: 25.0,
            duration_hours: Some(6.0),
            level: Some(level.into()),
        }
    }

    #[test]
    fn test_create_and_enroll() {
        let (store, _dir) = test_store();
        let tutor = add_user(&store, "Tutor", Role::Seller);
        let student = add_user(&store, "Student", Role::Buyer);

        let c = store.create_course(tutor, &course("Intro to Excel", "beginner")).unwrap();
        assert_eq!(c.instructor_name, "Tutor");
        assert_eq!(c.enrollment_count, 0);

        let after = store.enroll(c.id, student).unwrap();
        assert_eq!(after.enrollment_count, 1);
        assert!(matches!(store.enroll(c.id, student), Err(Error::Conflict(_))));
        assert!(matches!(store.enroll(c.id, tutor), Err(Error::Validation(_))));
        assert!(matches!(store.enroll(31337, student), Err(Error::NotFound(_))));

        let mine = store.enrollments_for_user(student).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, c.id);
    }

    #[test]
    fn test_course_validation() {
        let (store, _dir) = test_store();
        let tutor = add_user(&store, "Tutor", Role::Seller);

        let mut bad = course("Soap making", "beginner");
        bad.duration_hours = Some(0.0);
        assert!(matches!(store.create_course(tutor, &bad), Err(Error::Validation(_))));

        let mut bad = course("Soap making", "beginner");
        bad.price = -1.0;
        assert!(matches!(store.create_course(tutor, &bad), Err(Error::Validation(_))));
    }

    #[test]
    fn test_update_list_delete() {
        let (store, _dir) = test_store();
        let tutor = add_user(&store, "Tutor", Role::Seller);
        let a = store.create_course(tutor, &course("Baking basics", "beginner")).unwrap();
        store.create_course(tutor, &course("Advanced pastry", "advanced")).unwrap();

        let updated = store
            .update_course(
                a.id,
                &CourseUpdate {
                    price: Some(0.0),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.price, 0.0);
        assert_eq!(updated.title, "Baking basics");

        let beginners = store
            .list_courses(&CourseFilter {
                level: Some("Beginner".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(beginners.total, 1);

        let pastry = store
            .list_courses(&CourseFilter {
                query: Some("pastry".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pastry.items.len(), 1);

        assert!(store.delete_course(a.id).unwrap());
        assert!(store.get_course(a.id).unwrap().is_none());
        let remaining = store
            .list_courses(&CourseFilter {
                instructor_id: Some(tutor),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(remaining.total, 1);
    }
}

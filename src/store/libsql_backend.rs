//! libSQL backend — async `ProfileStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::onboarding::model::{AcademicLevel, NewProfile, Profile};
use crate::store::migrations;
use crate::store::traits::ProfileStore;

const PROFILE_COLUMNS: &str = "id, name, avatar_url, academic_level, bio, phone, email, \
     rating, total_reviews, created_at, updated_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a Profile. Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<Profile, DatabaseError> {
    let level_str: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("profile row: {e}")))?;
    let academic_level: AcademicLevel = level_str
        .parse()
        .map_err(DatabaseError::Serialization)?;
    let created_str: String = row.get(9).unwrap_or_default();
    let updated_str: String = row.get(10).unwrap_or_default();

    Ok(Profile {
        id: row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("profile row: {e}")))?,
        name: row.get(1).unwrap_or_default(),
        avatar_url: row.get::<String>(2).ok(),
        academic_level,
        bio: row.get::<String>(4).ok(),
        phone: row.get(5).unwrap_or_default(),
        email: row.get::<String>(6).ok(),
        rating: row.get::<f64>(7).unwrap_or(NewProfile::INITIAL_RATING),
        total_reviews: row
            .get::<i64>(8)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn get_profile(&self, identity_id: &str) -> Result<Option<Profile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![identity_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let inserted = conn
            .execute(
                "INSERT INTO profiles (id, name, avatar_url, academic_level, bio, phone, email,
                    rating, total_reviews, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT (id) DO NOTHING",
                params![
                    profile.id.clone(),
                    profile.name.clone(),
                    opt_text(profile.avatar_url.as_deref()),
                    profile.academic_level.as_str(),
                    opt_text(profile.bio.as_deref()),
                    profile.phone.clone(),
                    opt_text(profile.email.as_deref()),
                    profile.rating,
                    i64::from(profile.total_reviews),
                    now_str,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_profile: {e}")))?;

        if inserted == 0 {
            return Err(DatabaseError::Constraint(format!(
                "profile already exists for identity {}",
                profile.id
            )));
        }

        debug!(identity_id = %profile.id, "Profile inserted into DB");
        Ok(Profile {
            id: profile.id.clone(),
            name: profile.name.clone(),
            avatar_url: profile.avatar_url.clone(),
            academic_level: profile.academic_level,
            bio: profile.bio.clone(),
            phone: profile.phone.clone(),
            email: profile.email.clone(),
            rating: profile.rating,
            total_reviews: profile.total_reviews,
            created_at: now,
            updated_at: now,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

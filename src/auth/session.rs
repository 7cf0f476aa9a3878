//! Session identity helpers and the database-backed session store.

use {
    crate::Result,
    async_trait::async_trait,
    sqlx_postgres::{PgPool, Postgres},
    sqlx::Row as _,
    time::OffsetDateTime,
    tower_sessions::{
        Session,
        session::{Id, Record},
        session_store::{self, SessionStore},
    },
};

/// Session key holding the authenticated user's primary key.
pub const SESSION_KEY: &str = "id";

/// What the session says about its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIdentity {
    Guest,
    User(i64),
    /// Something other than a user id is stored under [`SESSION_KEY`].
    Malformed,
}

/// Reads the identity stored in the session.
pub async fn session_identity(session: &Session) -> Result<SessionIdentity> {
    Ok(match session.get_value(SESSION_KEY).await? {
        None => SessionIdentity::Guest,
        Some(value) => value
            .as_i64()
            .map_or(SessionIdentity::Malformed, SessionIdentity::User),
    })
}

/// Reads the user id stored in the session, if any.
pub async fn current_user_id(session: &Session) -> Result<Option<i64>> {
    Ok(match session_identity(session).await? {
        SessionIdentity::User(id) => Some(id),
        SessionIdentity::Guest | SessionIdentity::Malformed => None,
    })
}

/// Marks the session as belonging to `user_id`. The session id is cycled
/// first so a pre-login cookie cannot be reused.
pub async fn login(session: &Session, user_id: i64) -> Result<()> {
    session.cycle_id().await?;
    session.insert(SESSION_KEY, user_id).await?;
    tracing::info!(user_id, "user logged in");
    Ok(())
}

/// Drops all session data and the session record.
pub async fn logout(session: &Session) -> Result<()> {
    session.flush().await?;
    Ok(())
}

/// Stores session records as JSON in the `session(id, data)` table.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the session table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query::<Postgres>(
            "CREATE TABLE IF NOT EXISTS session (id VARCHAR(64) PRIMARY KEY, data JSON NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn encode(record: &Record) -> session_store::Result<String> {
        serde_json::to_string(record).map_err(|e| session_store::Error::Encode(e.to_string()))
    }
}

fn backend(err: sqlx::Error) -> session_store::Error {
    session_store::Error::Backend(err.to_string())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        loop {
            let inserted = sqlx::query::<Postgres>(
                "INSERT INTO session (id, data) VALUES ($1, $2::json) ON CONFLICT (id) DO NOTHING",
            )
            .bind(record.id.to_string())
            .bind(Self::encode(record)?)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

            if inserted.rows_affected() > 0 {
                return Ok(());
            }
            record.id = Id::default();
        }
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        sqlx::query::<Postgres>(
            "INSERT INTO session (id, data) VALUES ($1, $2::json) \
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(record.id.to_string())
        .bind(Self::encode(record)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let row = sqlx::query::<Postgres>("SELECT data::text AS data FROM session WHERE id = $1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row.try_get("data").map_err(backend)?;
        let record: Record = serde_json::from_str(&data)
            .map_err(|e| session_store::Error::Decode(e.to_string()))?;

        if record.expiry_date <= OffsetDateTime::now_utc() {
            self.delete(session_id).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        sqlx::query::<Postgres>("DELETE FROM session WHERE id = $1")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    #[tokio::test]
    async fn login_then_logout_round_trip() {
        let app = Router::new()
            .route(
                "/login",
                get(|session: Session| async move {
                    login(&session, 42).await.unwrap();
                    current_user_id(&session).await.unwrap().unwrap().to_string()
                }),
            )
            .route(
                "/whoami",
                get(|session: Session| async move {
                    format!("{:?}", current_user_id(&session).await.unwrap())
                }),
            )
            .route(
                "/logout",
                get(|session: Session| async move {
                    logout(&session).await.unwrap();
                    "bye"
                }),
            )
            .layer(SessionManagerLayer::new(MemoryStore::default()));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = response
            .headers()
            .get(http::header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let whoami = |cookie: String| {
            let app = app.clone();
            async move {
                let response = app
                    .oneshot(
                        Request::builder()
                            .uri("/whoami")
                            .header(http::header::COOKIE, cookie)
                            .body(Body::empty())
                            .unwrap(),
                    )
                    .await
                    .unwrap();
                let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap();
                String::from_utf8(body.to_vec()).unwrap()
            }
        };

        assert_eq!(whoami(cookie.clone()).await, "Some(42)");

        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/logout")
                    .header(http::header::COOKIE, cookie.clone())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(whoami(cookie).await, "None");
    }

    #[tokio::test]
    async fn missing_session_key_is_none() {
        let store = std::sync::Arc::new(MemoryStore::default());
        let session = Session::new(None, store, None);
        assert_eq!(current_user_id(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_numeric_identity_is_malformed() {
        let store = std::sync::Arc::new(MemoryStore::default());
        let session = Session::new(None, store, None);

        session.insert(SESSION_KEY, "12").await.unwrap();
        assert_eq!(session_identity(&session).await.unwrap(), SessionIdentity::Malformed);
        assert_eq!(current_user_id(&session).await.unwrap(), None);

        session.insert(SESSION_KEY, 12).await.unwrap();
        assert_eq!(session_identity(&session).await.unwrap(), SessionIdentity::User(12));
    }
}

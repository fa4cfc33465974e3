//! PostgreSQL object store
//!
//! Objects live in a single `objects` table keyed by (kind, namespace, name).
//! The identity columns are authoritative and overwrite whatever the
//! `metadata` JSON says on the way out. Cascading deletion is delegated to the
//! `owner_uid` foreign key.

use async_trait::async_trait;
use hedron_core::domain::meta::{Kind, ObjectKey, ObjectMeta};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    Change, DynamicObject, EVENT_BUFFER, ObjectEvent, ObjectStore, StoreError, StoreResult,
    merge_replace, merge_status, prepare_create,
};

/// Postgres error code for a foreign key violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

const SELECT_COLUMNS: &str = r#"
    SELECT kind, namespace, name, uid, resource_version, generation,
           creation_timestamp, owner_uid, metadata, data
    FROM objects
"#;

pub struct PostgresStore {
    pool: PgPool,
    events: broadcast::Sender<ObjectEvent>,
}

impl PostgresStore {
    /// Wraps a pool whose schema has already been migrated
    ///
    /// Events are only broadcast for writes made through this instance.
    pub fn new(pool: PgPool) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self { pool, events }
    }

    fn emit(&self, change: Change, object: &DynamicObject) {
        let _ = self.events.send(ObjectEvent {
            kind: object.kind,
            change,
            metadata: object.metadata.clone(),
        });
    }

    async fn lock_row(
        tx: &mut Transaction<'_, Postgres>,
        kind: Kind,
        key: &ObjectKey,
    ) -> StoreResult<DynamicObject> {
        let query = format!(
            "{} WHERE kind = $1 AND namespace = $2 AND name = $3 FOR UPDATE",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, ObjectRow>(&query)
            .bind(kind.as_str())
            .bind(&key.namespace)
            .bind(&key.name)
            .fetch_optional(&mut **tx)
            .await?;

        match row {
            Some(row) => row.into_object(),
            None => Err(StoreError::NotFound {
                kind,
                key: key.clone(),
            }),
        }
    }

    /// Writes back a merged object inside `tx`, returning the new version
    async fn write_back(
        tx: &mut Transaction<'_, Postgres>,
        object: &DynamicObject,
    ) -> StoreResult<u64> {
        let version: i64 = sqlx::query_scalar(
            r#"
            UPDATE objects
            SET resource_version = nextval('object_resource_version'),
                generation = $4,
                owner_uid = $5,
                metadata = $6,
                data = $7
            WHERE kind = $1 AND namespace = $2 AND name = $3
            RETURNING resource_version
            "#,
        )
        .bind(object.kind.as_str())
        .bind(&object.metadata.namespace)
        .bind(&object.metadata.name)
        .bind(object.metadata.generation as i64)
        .bind(object.owner_uid())
        .bind(serde_json::to_value(&object.metadata)?)
        .bind(&object.data)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_write_error)?;

        Ok(version as u64)
    }

    async fn update_with(
        &self,
        object: DynamicObject,
        merge: fn(DynamicObject, DynamicObject) -> StoreResult<DynamicObject>,
    ) -> StoreResult<DynamicObject> {
        let mut tx = self.pool.begin().await?;

        let existing = Self::lock_row(&mut tx, object.kind, &object.key()).await?;
        let mut merged = merge(existing, object)?;
        merged.metadata.resource_version = Self::write_back(&mut tx, &merged).await?;

        tx.commit().await?;

        self.emit(Change::Modified, &merged);
        Ok(merged)
    }
}

#[async_trait]
impl ObjectStore for PostgresStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<DynamicObject> {
        let query = format!(
            "{} WHERE kind = $1 AND namespace = $2 AND name = $3",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, ObjectRow>(&query)
            .bind(kind.as_str())
            .bind(&key.namespace)
            .bind(&key.name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_object(),
            None => Err(StoreError::NotFound {
                kind,
                key: key.clone(),
            }),
        }
    }

    async fn create(&self, object: DynamicObject) -> StoreResult<DynamicObject> {
        let mut object = prepare_create(object, chrono::Utc::now())?;

        let version: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO objects (kind, namespace, name, uid, resource_version, generation,
                                 creation_timestamp, owner_uid, metadata, data)
            VALUES ($1, $2, $3, $4, nextval('object_resource_version'), $5, $6, $7, $8, $9)
            ON CONFLICT (kind, namespace, name) DO NOTHING
            RETURNING resource_version
            "#,
        )
        .bind(object.kind.as_str())
        .bind(&object.metadata.namespace)
        .bind(&object.metadata.name)
        .bind(object.metadata.uid)
        .bind(object.metadata.generation as i64)
        .bind(object.metadata.creation_timestamp)
        .bind(object.owner_uid())
        .bind(serde_json::to_value(&object.metadata)?)
        .bind(&object.data)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        let Some(version) = version else {
            return Err(StoreError::AlreadyExists {
                kind: object.kind,
                key: object.key(),
            });
        };

        object.metadata.resource_version = version as u64;
        self.emit(Change::Created, &object);
        Ok(object)
    }

    async fn replace(&self, object: DynamicObject) -> StoreResult<DynamicObject> {
        self.update_with(object, merge_replace).await
    }

    async fn replace_status(&self, object: DynamicObject) -> StoreResult<DynamicObject> {
        self.update_with(object, merge_status).await
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Collect the whole subtree first so every removal can be announced;
        // the foreign key does the actual cascading.
        let rows = sqlx::query_as::<_, ObjectRow>(
            r#"
            WITH RECURSIVE doomed AS (
                SELECT * FROM objects WHERE kind = $1 AND namespace = $2 AND name = $3
                UNION ALL
                SELECT o.* FROM objects o JOIN doomed d ON o.owner_uid = d.uid
            )
            SELECT kind, namespace, name, uid, resource_version, generation,
                   creation_timestamp, owner_uid, metadata, data
            FROM doomed
            "#,
        )
        .bind(kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound {
                kind,
                key: key.clone(),
            });
        }

        sqlx::query("DELETE FROM objects WHERE kind = $1 AND namespace = $2 AND name = $3")
            .bind(kind.as_str())
            .bind(&key.namespace)
            .bind(&key.name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        for row in rows {
            match row.into_object() {
                Ok(object) => self.emit(Change::Deleted, &object),
                Err(err) => tracing::warn!("Deleted an unreadable object: {}", err),
            }
        }
        Ok(())
    }

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<DynamicObject>> {
        let rows = match namespace {
            Some(namespace) => {
                let query = format!(
                    "{} WHERE kind = $1 AND namespace = $2 ORDER BY namespace, name",
                    SELECT_COLUMNS
                );
                sqlx::query_as::<_, ObjectRow>(&query)
                    .bind(kind.as_str())
                    .bind(namespace)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let query = format!("{} WHERE kind = $1 ORDER BY namespace, name", SELECT_COLUMNS);
                sqlx::query_as::<_, ObjectRow>(&query)
                    .bind(kind.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(ObjectRow::into_object).collect()
    }

    async fn list_owned(
        &self,
        kind: Kind,
        namespace: &str,
        owner: Uuid,
    ) -> StoreResult<Vec<DynamicObject>> {
        let query = format!(
            "{} WHERE kind = $1 AND namespace = $2 AND owner_uid = $3 ORDER BY name",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ObjectRow>(&query)
            .bind(kind.as_str())
            .bind(namespace)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ObjectRow::into_object).collect()
    }

    fn watch(&self) -> broadcast::Receiver<ObjectEvent> {
        self.events.subscribe()
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return StoreError::Invalid(format!("owner does not exist: {}", db.message()));
        }
    }
    StoreError::Database(err)
}

// Database row struct
#[derive(sqlx::FromRow)]
struct ObjectRow {
    kind: String,
    namespace: String,
    name: String,
    uid: Uuid,
    resource_version: i64,
    generation: i64,
    creation_timestamp: chrono::DateTime<chrono::Utc>,
    #[allow(dead_code)]
    owner_uid: Option<Uuid>,
    metadata: serde_json::Value,
    data: serde_json::Value,
}

impl ObjectRow {
    fn into_object(self) -> StoreResult<DynamicObject> {
        let kind = Kind::parse(&self.kind)
            .ok_or_else(|| StoreError::Invalid(format!("unknown kind {:?}", self.kind)))?;

        let mut metadata: ObjectMeta = serde_json::from_value(self.metadata)?;
        metadata.namespace = self.namespace;
        metadata.name = self.name;
        metadata.uid = Some(self.uid);
        metadata.resource_version = self.resource_version as u64;
        metadata.generation = self.generation as u64;
        metadata.creation_timestamp = Some(self.creation_timestamp);

        Ok(DynamicObject {
            kind,
            metadata,
            data: self.data,
        })
    }
}

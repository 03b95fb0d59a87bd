// crates/jobflow/src/queue/postgres.rs
//
// Queue on a Postgres table. Receiving is a lease: the row is claimed with
// FOR UPDATE SKIP LOCKED and pushed into the future by the visibility timeout.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Queue, QueueMessage};

#[derive(Clone)]
pub struct PgQueue {
    pool: PgPool,
    name: String,
    default_visibility_secs: i64,
}

impl PgQueue {
    pub fn new(pool: PgPool, name: &str, default_visibility_secs: i64) -> Self {
        Self {
            pool,
            name: name.to_string(),
            default_visibility_secs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Queue for PgQueue {
    async fn send(&self, body: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_messages (id, queue, body, visible_at, receive_count)
            VALUES ($1, $2, $3, now(), 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&self.name)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Option<QueueMessage>> {
        let mut tx = self.pool.begin().await?;

        // 1) pick one visible message and lock it
        let candidate = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM queue_messages
            WHERE queue = $1
              AND visible_at <= now()
            ORDER BY visible_at ASC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(&self.name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        // 2) hide it and count the delivery
        let (body, receive_count) = sqlx::query_as::<_, (String, i32)>(
            r#"
            UPDATE queue_messages
            SET receive_count = receive_count + 1,
                visible_at = now() + ($2::int * interval '1 second')
            WHERE id = $1
            RETURNING body, receive_count
            "#,
        )
        .bind(id)
        .bind(self.default_visibility_secs as i32)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(QueueMessage {
            receipt: id,
            body,
            receive_count: receive_count as i64,
        }))
    }

    async fn set_visibility_timeout(
        &self,
        message: &QueueMessage,
        seconds: i64,
    ) -> anyhow::Result<()> {
        let seconds = seconds.clamp(0, self.max_visibility_timeout());
        sqlx::query(
            r#"
            UPDATE queue_messages
            SET visible_at = now() + ($2::int * interval '1 second')
            WHERE id = $1
            "#,
        )
        .bind(message.receipt)
        .bind(seconds as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ack(&self, message: &QueueMessage) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(message.receipt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! Postgres implementation of LinkStore.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    LinkPayment, LinkStatus, PaymentEntry, PaymentLink, PaymentMethod, PaymentOutcome,
};
use crate::ports::{LinkStore, RecordOutcome, StoreError, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed payment link store.
#[derive(Clone)]
pub struct PostgresLinkStore {
    pool: PgPool,
}

impl PostgresLinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_link(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> StoreResult<PaymentLink> {
        let row = sqlx::query_as::<_, LinkRow>(
            "SELECT * FROM payment_links WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment link {}", id)))?
            .into_domain()
    }

    async fn outcome_of(
        tx: &mut Transaction<'_, Postgres>,
        provider_reference: &str,
    ) -> StoreResult<PaymentOutcome> {
        let (outcome,): (String,) =
            sqlx::query_as("SELECT outcome FROM link_payments WHERE provider_reference = $1")
                .bind(provider_reference)
                .fetch_one(&mut **tx)
                .await?;

        PaymentOutcome::parse(&outcome)
            .ok_or_else(|| StoreError::Corrupt(format!("payment outcome '{}'", outcome)))
    }
}

#[async_trait]
impl LinkStore for PostgresLinkStore {
    async fn insert(&self, link: &PaymentLink) -> StoreResult<PaymentLink> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            INSERT INTO payment_links (
                id, short_code, title, description, amount, currency, status,
                expires_at, max_uses, current_uses, collect_phone, collect_shipping,
                redirect_url, success_message, total_revenue, successful_payments,
                failed_payments, views, created_at, updated_at, deleted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING *
            "#,
        )
        .bind(link.id)
        .bind(&link.short_code)
        .bind(&link.title)
        .bind(&link.description)
        .bind(&link.amount)
        .bind(&link.currency)
        .bind(link.status.as_str())
        .bind(link.expires_at)
        .bind(link.max_uses)
        .bind(link.current_uses)
        .bind(link.collect_phone)
        .bind(link.collect_shipping)
        .bind(&link.redirect_url)
        .bind(&link.success_message)
        .bind(&link.total_revenue)
        .bind(link.successful_payments)
        .bind(link.failed_payments)
        .bind(link.views)
        .bind(link.created_at)
        .bind(link.updated_at)
        .bind(link.deleted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let unique = e
                .as_database_error()
                .and_then(|db| db.code())
                .as_deref()
                == Some(UNIQUE_VIOLATION);
            if unique {
                StoreError::DuplicateShortCode(link.short_code.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<PaymentLink> {
        let row = sqlx::query_as::<_, LinkRow>("SELECT * FROM payment_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment link {}", id)))?
            .into_domain()
    }

    async fn get_by_short_code(&self, short_code: &str) -> StoreResult<PaymentLink> {
        let row = sqlx::query_as::<_, LinkRow>(
            "SELECT * FROM payment_links WHERE short_code = $1 AND deleted_at IS NULL",
        )
        .bind(short_code)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment link {}", short_code)))?
            .into_domain()
    }

    async fn resolve_short_code(&self, short_code: &str) -> StoreResult<PaymentLink> {
        let row = sqlx::query_as::<_, LinkRow>("SELECT * FROM payment_links WHERE short_code = $1")
            .bind(short_code)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment link {}", short_code)))?
            .into_domain()
    }

    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<PaymentLink>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT * FROM payment_links
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LinkRow::into_domain).collect()
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: LinkStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentLink> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            UPDATE payment_links SET status = $2, updated_at = $3
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment link {}", id)))?
            .into_domain()
    }

    async fn tombstone(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<PaymentLink> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            UPDATE payment_links
            SET deleted_at = COALESCE(deleted_at, $2), updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment link {}", id)))?
            .into_domain()
    }

    async fn record_view(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE payment_links SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_success(
        &self,
        entry: &PaymentEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RecordOutcome> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes reconciliations per link.
        let current = Self::lock_link(&mut tx, entry.link_id).await?;

        // Claims the reference; a prior `failed` row may be upgraded, anything
        // else means this payment was already applied.
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO link_payments (
                provider_reference, link_id, amount, currency, rail, outcome,
                payer_email, payer_name, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'succeeded', $6, $7, $8, $8)
            ON CONFLICT (provider_reference) DO UPDATE
                SET outcome = 'succeeded', updated_at = EXCLUDED.updated_at
                WHERE link_payments.outcome = 'failed'
            RETURNING provider_reference
            "#,
        )
        .bind(&entry.provider_reference)
        .bind(entry.link_id)
        .bind(&entry.amount)
        .bind(&entry.currency)
        .bind(entry.rail.as_str())
        .bind(&entry.payer.email)
        .bind(&entry.payer.name)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            let outcome = Self::outcome_of(&mut tx, &entry.provider_reference).await?;
            tx.commit().await?;
            return Ok(RecordOutcome::AlreadyRecorded {
                link: current,
                outcome,
            });
        }

        let updated = sqlx::query_as::<_, LinkRow>(
            r#"
            UPDATE payment_links SET
                current_uses = current_uses + 1,
                successful_payments = successful_payments + 1,
                total_revenue = total_revenue + $2,
                status = CASE
                    WHEN status = 'disabled' THEN 'disabled'
                    WHEN max_uses IS NOT NULL AND current_uses + 1 >= max_uses THEN 'expired'
                    WHEN expires_at IS NOT NULL AND expires_at < $3 THEN 'expired'
                    ELSE status
                END,
                updated_at = $3
            WHERE id = $1 AND (max_uses IS NULL OR current_uses < max_uses)
            RETURNING *
            "#,
        )
        .bind(entry.link_id)
        .bind(&entry.amount)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(row) => {
                let link = row.into_domain()?;
                tx.commit().await?;
                Ok(RecordOutcome::Applied(link))
            }
            None => {
                sqlx::query(
                    "UPDATE link_payments SET outcome = 'flagged', updated_at = $2 WHERE provider_reference = $1",
                )
                .bind(&entry.provider_reference)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(RecordOutcome::CapReached(current))
            }
        }
    }

    async fn record_failure(
        &self,
        entry: &PaymentEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RecordOutcome> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_link(&mut tx, entry.link_id).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO link_payments (
                provider_reference, link_id, amount, currency, rail, outcome,
                payer_email, payer_name, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'failed', $6, $7, $8, $8)
            ON CONFLICT (provider_reference) DO NOTHING
            "#,
        )
        .bind(&entry.provider_reference)
        .bind(entry.link_id)
        .bind(&entry.amount)
        .bind(&entry.currency)
        .bind(entry.rail.as_str())
        .bind(&entry.payer.email)
        .bind(&entry.payer.name)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let outcome = Self::outcome_of(&mut tx, &entry.provider_reference).await?;
            tx.commit().await?;
            return Ok(RecordOutcome::AlreadyRecorded {
                link: current,
                outcome,
            });
        }

        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            UPDATE payment_links SET failed_payments = failed_payments + 1, updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(entry.link_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let link = row.into_domain()?;
        tx.commit().await?;
        Ok(RecordOutcome::Applied(link))
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_links SET status = 'expired', updated_at = $1
            WHERE status = 'active'
              AND deleted_at IS NULL
              AND (
                (expires_at IS NOT NULL AND expires_at < $1)
                OR (max_uses IS NOT NULL AND current_uses >= max_uses)
              )
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_payment(&self, provider_reference: &str) -> StoreResult<Option<LinkPayment>> {
        let row = sqlx::query_as::<_, LinkPaymentRow>(
            "SELECT * FROM link_payments WHERE provider_reference = $1",
        )
        .bind(provider_reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LinkPaymentRow::into_domain).transpose()
    }

    async fn list_flagged(&self, limit: i64, offset: i64) -> StoreResult<Vec<LinkPayment>> {
        let rows = sqlx::query_as::<_, LinkPaymentRow>(
            r#"
            SELECT * FROM link_payments
            WHERE outcome = 'flagged'
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LinkPaymentRow::into_domain).collect()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    id: Uuid,
    short_code: String,
    title: String,
    description: Option<String>,
    amount: BigDecimal,
    currency: String,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    max_uses: Option<i32>,
    current_uses: i32,
    collect_phone: bool,
    collect_shipping: bool,
    redirect_url: Option<String>,
    success_message: Option<String>,
    total_revenue: BigDecimal,
    successful_payments: i32,
    failed_payments: i32,
    views: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl LinkRow {
    fn into_domain(self) -> StoreResult<PaymentLink> {
        let status = LinkStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("link status '{}'", self.status)))?;

        Ok(PaymentLink {
            id: self.id,
            short_code: self.short_code,
            title: self.title,
            description: self.description,
            amount: self.amount,
            currency: self.currency,
            status,
            expires_at: self.expires_at,
            max_uses: self.max_uses,
            current_uses: self.current_uses,
            collect_phone: self.collect_phone,
            collect_shipping: self.collect_shipping,
            redirect_url: self.redirect_url,
            success_message: self.success_message,
            total_revenue: self.total_revenue,
            successful_payments: self.successful_payments,
            failed_payments: self.failed_payments,
            views: self.views,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LinkPaymentRow {
    provider_reference: String,
    link_id: Uuid,
    amount: BigDecimal,
    currency: String,
    rail: String,
    outcome: String,
    payer_email: Option<String>,
    payer_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LinkPaymentRow {
    fn into_domain(self) -> StoreResult<LinkPayment> {
        let rail = PaymentMethod::parse(&self.rail)
            .ok_or_else(|| StoreError::Corrupt(format!("payment rail '{}'", self.rail)))?;
        let outcome = PaymentOutcome::parse(&self.outcome)
            .ok_or_else(|| StoreError::Corrupt(format!("payment outcome '{}'", self.outcome)))?;

        Ok(LinkPayment {
            provider_reference: self.provider_reference,
            link_id: self.link_id,
            amount: self.amount,
            currency: self.currency,
            rail,
            outcome,
            payer_email: self.payer_email,
            payer_name: self.payer_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

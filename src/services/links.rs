use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{is_payable, Availability, LinkStatus, NewPaymentLink, PaymentLink};
use crate::error::AppError;
use crate::ports::{LinkStore, StoreError};
use crate::validation;

const SHORT_CODE_ATTEMPTS: usize = 5;
pub const MAX_PAGE_SIZE: i64 = 100;

/// 8 URL-safe characters from 6 random bytes.
pub fn generate_short_code() -> String {
    let id = Uuid::new_v4();
    URL_SAFE_NO_PAD.encode(&id.as_bytes()[..6])
}

/// Merchant view of a link with derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    #[serde(flatten)]
    pub link: PaymentLink,
    pub url: String,
    pub conversion_rate: f64,
    pub uses_remaining: Option<i32>,
    pub availability: Availability,
}

pub struct LinkService {
    store: Arc<dyn LinkStore>,
    public_base_url: String,
}

impl LinkService {
    pub fn new(store: Arc<dyn LinkStore>, public_base_url: String) -> Self {
        Self {
            store,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn summarize(&self, link: PaymentLink) -> LinkSummary {
        LinkSummary {
            url: format!("{}/pay/{}", self.public_base_url, link.short_code),
            conversion_rate: link.conversion_rate(),
            uses_remaining: link.uses_remaining(),
            availability: is_payable(&link, Utc::now()),
            link,
        }
    }

    pub async fn create(&self, input: NewPaymentLink) -> Result<LinkSummary, AppError> {
        let now = Utc::now();
        let input = validation::validate_new_link(&input, now)?;

        for _ in 0..SHORT_CODE_ATTEMPTS {
            let link = PaymentLink::new(input.clone(), generate_short_code(), now);
            match self.store.insert(&link).await {
                Ok(link) => {
                    info!(
                        link_id = %link.id,
                        short_code = %link.short_code,
                        amount = %link.amount,
                        currency = %link.currency,
                        "Payment link created"
                    );
                    return Ok(self.summarize(link));
                }
                Err(StoreError::DuplicateShortCode(code)) => {
                    tracing::debug!(short_code = %code, "Short code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(
            "could not allocate a unique short code".to_string(),
        ))
    }

    /// Tombstoned links are not returned.
    pub async fn get(&self, id: Uuid) -> Result<LinkSummary, AppError> {
        let link = self.store.get_by_id(id).await?;
        if link.is_deleted() {
            return Err(AppError::NotFound(format!("payment link {}", id)));
        }
        Ok(self.summarize(link))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<LinkSummary>, AppError> {
        let links = self
            .store
            .list(limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
            .await?;
        Ok(links.into_iter().map(|l| self.summarize(l)).collect())
    }

    /// Lifts a merchant disable. Usage or time expiry is not undone here.
    pub async fn enable(&self, id: Uuid) -> Result<LinkSummary, AppError> {
        let link = self.get(id).await?.link;
        if link.status != LinkStatus::Disabled {
            return Ok(self.summarize(link));
        }

        let now = Utc::now();
        let status = match is_payable(
            &PaymentLink {
                status: LinkStatus::Active,
                ..link.clone()
            },
            now,
        )
        .check()
        {
            Ok(()) => LinkStatus::Active,
            Err(_) => LinkStatus::Expired,
        };

        let link = self.store.set_status(id, status, now).await?;
        info!(link_id = %id, status = %link.status, "Payment link enabled");
        Ok(self.summarize(link))
    }

    pub async fn disable(&self, id: Uuid) -> Result<LinkSummary, AppError> {
        self.get(id).await?;
        let link = self
            .store
            .set_status(id, LinkStatus::Disabled, Utc::now())
            .await?;
        info!(link_id = %id, "Payment link disabled");
        Ok(self.summarize(link))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.get(id).await?;
        self.store.tombstone(id, Utc::now()).await?;
        info!(link_id = %id, "Payment link deleted");
        Ok(())
    }
}

pub mod memory_ledger;
pub mod memory_link_store;
pub mod postgres_link_store;
pub mod redis_ledger;

pub use memory_ledger::InMemoryLedger;
pub use memory_link_store::InMemoryLinkStore;
pub use postgres_link_store::PostgresLinkStore;
pub use redis_ledger::RedisLedger;

use chrono::{DateTime, Utc};

use crate::domain::{LinkStatus, PaymentLink};

/// Status a link should carry given its counters at `now`.
/// Mirrors the `CASE` expression in the Postgres adapter.
pub(crate) fn status_after_payment(link: &PaymentLink, now: DateTime<Utc>) -> LinkStatus {
    if link.status == LinkStatus::Disabled {
        return LinkStatus::Disabled;
    }

    let cap_reached = link
        .max_uses
        .map(|max| link.current_uses >= max)
        .unwrap_or(false);
    let lapsed = link.expires_at.map(|at| now > at).unwrap_or(false);

    if cap_reached || lapsed {
        LinkStatus::Expired
    } else {
        link.status
    }
}

//! Read receipt tracking

use chrono::Utc;

use crate::store::{ChatStore, ReadReceipt, StoreResult};
use crate::types::MessageId;

/// Record that `username` has read a message
///
/// Idempotent per (message, user): a repeated call returns the receipt
/// created by the first one, including its original `read_at`.
pub async fn mark_as_read(
    store: &dyn ChatStore,
    message_id: MessageId,
    username: &str,
) -> StoreResult<ReadReceipt> {
    let (receipt, _created) = store
        .find_or_create_receipt(message_id, username, Utc::now())
        .await?;
    Ok(receipt)
}

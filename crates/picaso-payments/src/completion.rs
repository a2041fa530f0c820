//! Checkout Completion
//!
//! What happens when the buyer comes back from the hosted checkout page.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use picaso_core::{Artwork, ArtworkSession};
use serde::{Deserialize, Serialize};

/// Business days between order and estimated delivery
pub const DELIVERY_BUSINESS_DAYS: u32 = 7;

const SESSION_ID_DISPLAY_CHARS: usize = 20;

/// Shown after a successful checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub session_id: String,
    pub display_session_id: String,
    pub estimated_delivery: NaiveDate,
    pub estimated_delivery_label: String,
    pub message: String,
}

/// Shown after an abandoned checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotice {
    pub message: String,
    pub artwork: Option<Artwork>,
}

/// Add `business_days` weekdays after `from`, skipping Saturdays and Sundays
pub fn estimated_delivery(from: NaiveDate, business_days: u32) -> NaiveDate {
    let mut date = from;
    let mut counted = 0;
    while counted < business_days {
        date += Duration::days(1);
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            counted += 1;
        }
    }
    date
}

fn display_session_id(session_id: &str) -> String {
    if session_id.chars().count() > SESSION_ID_DISPLAY_CHARS {
        let head: String = session_id.chars().take(SESSION_ID_DISPLAY_CHARS).collect();
        format!("{head}...")
    } else {
        session_id.to_string()
    }
}

/// Finish an order: drop the artwork snapshot and build the confirmation
///
/// Clearing is best effort; the buyer has already paid.
pub fn handle_success(session: &ArtworkSession, session_id: &str, today: NaiveDate) -> OrderConfirmation {
    if let Err(e) = session.clear() {
        tracing::warn!(error = %e, session_id, "Failed to clear artwork snapshot after checkout");
    }

    let delivery = estimated_delivery(today, DELIVERY_BUSINESS_DAYS);
    tracing::info!(session_id, %delivery, "Checkout completed");

    OrderConfirmation {
        session_id: session_id.to_string(),
        display_session_id: display_session_id(session_id),
        estimated_delivery: delivery,
        estimated_delivery_label: delivery.format("%A, %B %-d, %Y").to_string(),
        message: "Your order has been successfully placed!".into(),
    }
}

/// Abandon checkout; the snapshot stays so the buyer can try again
pub fn handle_cancel(session: &ArtworkSession) -> CancelNotice {
    let artwork = session.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to read artwork snapshot");
        None
    });
    tracing::info!(has_artwork = artwork.is_some(), "Checkout cancelled");

    CancelNotice {
        message: "Checkout was cancelled. Your artwork is still available for purchase.".into(),
        artwork,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picaso_core::{Filters, KeyValueStore, MemoryKeyValueStore};
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session_with_artwork() -> ArtworkSession {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let session = ArtworkSession::new(store);
        session
            .save(&Artwork {
                image_url: "https://store.example/images/1-a.png".into(),
                prompt: "a red fox in snow".into(),
                filters: Filters::new(),
                timestamp: 1,
                is_permanent: true,
            })
            .unwrap();
        session
    }

    #[test]
    fn test_delivery_skips_weekends() {
        // Tuesday + 7 business days = next Thursday
        assert_eq!(estimated_delivery(date(2023, 11, 14), 7), date(2023, 11, 23));
        // Friday + 7 business days = Tuesday after next
        assert_eq!(estimated_delivery(date(2023, 11, 17), 7), date(2023, 11, 28));
        // Saturday starts counting on Monday
        assert_eq!(estimated_delivery(date(2023, 11, 18), 1), date(2023, 11, 20));
    }

    #[test]
    fn test_success_clears_snapshot() {
        let session = session_with_artwork();
        let confirmation = handle_success(&session, "cs_test_a1b2c3d4e5f6g7h8i9j0k1", date(2023, 11, 14));

        assert_eq!(session.load().unwrap(), None);
        assert_eq!(confirmation.display_session_id, "cs_test_a1b2c3d4e5f6...");
        assert_eq!(confirmation.estimated_delivery_label, "Thursday, November 23, 2023");
    }

    #[test]
    fn test_cancel_keeps_snapshot() {
        let session = session_with_artwork();
        let notice = handle_cancel(&session);

        assert!(notice.message.contains("still available"));
        assert_eq!(notice.artwork.unwrap().prompt, "a red fox in snow");
        assert!(session.load().unwrap().is_some());
    }
}

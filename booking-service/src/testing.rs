//! Fixtures shared by the test modules.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use shared::*;
use std::time::Duration;
use uuid::Uuid;

use crate::store::StoreTimeouts;

pub fn test_timeouts() -> StoreTimeouts {
    StoreTimeouts {
        lookup: Duration::from_secs(1),
        commit: Duration::from_secs(1),
    }
}

pub fn at(hour: u32) -> DateTime<Utc> {
    format!("2024-06-01T{hour:02}:00:00Z").parse().unwrap()
}

pub fn window_at(start_hour: u32, end_hour: u32) -> TimeWindow {
    TimeWindow::new(at(start_hour), at(end_hour)).unwrap()
}

/// A stored reservation owned by a fresh account.
pub fn stay(resource_id: Uuid, window: TimeWindow, status: ReservationStatus) -> Reservation {
    let mut reservation = NewReservation {
        id: Uuid::new_v4(),
        resource_id,
        identity: Identity::Authenticated {
            account_id: Uuid::new_v4(),
        },
        window,
        total_amount: BigDecimal::from(45),
        notes: None,
    }
    .into_pending(Utc::now());
    reservation.status = status;
    reservation
}

pub fn guest() -> Identity {
    Identity::Guest(GuestContact {
        name: "Sam Walker".into(),
        email: "sam@example.com".into(),
        phone: Some("555-0100".into()),
    })
}

/// A well-formed request for `window` on `resource_id`.
pub fn request_for(resource_id: Uuid, window: TimeWindow, identity: Identity) -> ReservationRequest {
    ReservationRequest {
        resource_id: Some(resource_id),
        start_time: Some(window.start.to_rfc3339()),
        end_time: Some(window.end.to_rfc3339()),
        total_amount: Some(BigDecimal::from(45)),
        notes: None,
        identity: Some(identity),
    }
}

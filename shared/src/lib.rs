use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

mod error;

pub use error::{BookingError, UnknownStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Statuses that hold a claim on the resource's time.
    pub const ACTIVE: [ReservationStatus; 2] = [ReservationStatus::Pending, ReservationStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Whether writing `target` over `self` changes the stored status.
    ///
    /// Terminal statuses are never reactivated and a confirmed booking is
    /// only left through cancellation, so a late or redelivered event cannot
    /// put a second active claim on an interval.
    pub fn can_transition_to(&self, target: ReservationStatus) -> bool {
        matches!(
            (self, target),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Cancelled)
                | (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Succeeded and cancelled intents are final at the provider; a failed
    /// intent may still be retried and move on.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        *self != target && !matches!(self, PaymentStatus::Succeeded | PaymentStatus::Cancelled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Payment outcome notifications delivered by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    Created,
    Processing,
    RequiresAction,
    Succeeded,
    PartiallyFunded,
    PaymentFailed,
    Canceled,
}

/// Target statuses written by one payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub payment: PaymentStatus,
    pub reservation: Option<ReservationStatus>,
}

impl PaymentEventKind {
    /// Maps a provider event type such as `payment_intent.succeeded`.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        let kind = match event_type.strip_prefix("payment_intent.")? {
            "created" => PaymentEventKind::Created,
            "processing" => PaymentEventKind::Processing,
            "requires_action" => PaymentEventKind::RequiresAction,
            "succeeded" => PaymentEventKind::Succeeded,
            "partially_funded" => PaymentEventKind::PartiallyFunded,
            "payment_failed" => PaymentEventKind::PaymentFailed,
            "canceled" => PaymentEventKind::Canceled,
            _ => return None,
        };
        Some(kind)
    }

    /// `None` for informational events that change nothing.
    pub fn transition(&self) -> Option<Transition> {
        let (payment, reservation) = match self {
            PaymentEventKind::Created => return None,
            PaymentEventKind::Processing
            | PaymentEventKind::RequiresAction
            | PaymentEventKind::PartiallyFunded => (PaymentStatus::Pending, None),
            PaymentEventKind::Succeeded => (PaymentStatus::Succeeded, Some(ReservationStatus::Confirmed)),
            PaymentEventKind::PaymentFailed => (PaymentStatus::Failed, Some(ReservationStatus::Pending)),
            PaymentEventKind::Canceled => (PaymentStatus::Cancelled, Some(ReservationStatus::Cancelled)),
        };
        Some(Transition { payment, reservation })
    }
}

/// Half-open `[start, end)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::validation("end_time", "must be after start_time"));
        }
        Ok(Self { start, end })
    }

    /// Parses RFC 3339 bounds, naming `start_time` or `end_time` on failure.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, BookingError> {
        Self::new(parse_instant("start_time", start)?, parse_instant("end_time", end)?)
    }

    /// Abutting windows do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Who a reservation is for, decided once when the request comes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Authenticated { account_id: Uuid },
    Guest(GuestContact),
}

impl Identity {
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            Identity::Authenticated { account_id } => Some(*account_id),
            Identity::Guest(_) => None,
        }
    }

    /// Account-owned reservations are reachable only by their owner; guest
    /// reservations are addressed by id alone.
    pub fn permits(&self, caller: Option<Uuid>) -> bool {
        match self {
            Identity::Authenticated { account_id } => caller == Some(*account_id),
            Identity::Guest(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub duration_hours: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub customer_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub identity: Identity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: ReservationStatus,
    pub total_amount: BigDecimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }
}

/// A validated reservation ready to be committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReservation {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub identity: Identity,
    pub window: TimeWindow,
    pub total_amount: BigDecimal,
    pub notes: Option<String>,
}

impl NewReservation {
    pub fn into_pending(self, now: DateTime<Utc>) -> Reservation {
        Reservation {
            id: self.id,
            resource_id: self.resource_id,
            identity: self.identity,
            start: self.window.start,
            end: self.window.end,
            status: ReservationStatus::Pending,
            total_amount: self.total_amount,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Active reservations on `resource_id` whose window overlaps `window`.
pub fn find_conflicts<'a>(
    candidates: impl IntoIterator<Item = &'a Reservation>,
    resource_id: Uuid,
    window: &TimeWindow,
    exclude: Option<Uuid>,
) -> Vec<Reservation> {
    candidates
        .into_iter()
        .filter(|r| r.resource_id == resource_id)
        .filter(|r| r.status.is_active())
        .filter(|r| Some(r.id) != exclude)
        .filter(|r| r.window().overlaps(window))
        .cloned()
        .collect()
}

/// Totals are stored as NUMERIC(10, 2).
const MAX_TOTAL_AMOUNT: i64 = 100_000_000;

/// Raw booking request as it arrives at the boundary.
#[derive(Debug, Clone, Default)]
pub struct ReservationRequest {
    pub resource_id: Option<Uuid>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_amount: Option<BigDecimal>,
    pub notes: Option<String>,
    pub identity: Option<Identity>,
}

impl ReservationRequest {
    pub fn validate(self) -> Result<NewReservation, BookingError> {
        let resource_id = self
            .resource_id
            .ok_or_else(|| BookingError::validation("service_id", "is required"))?;
        let window = TimeWindow::parse(self.start_time.as_deref(), self.end_time.as_deref())?;

        let total_amount = self
            .total_amount
            .ok_or_else(|| BookingError::validation("total_amount", "is required"))?;
        if total_amount <= BigDecimal::zero() {
            return Err(BookingError::validation("total_amount", "must be positive"));
        }
        if total_amount >= BigDecimal::from(MAX_TOTAL_AMOUNT) {
            return Err(BookingError::validation(
                "total_amount",
                format!("must be less than {}", MAX_TOTAL_AMOUNT),
            ));
        }
        if total_amount.with_scale(2) != total_amount {
            return Err(BookingError::validation("total_amount", "must have at most 2 decimal places"));
        }

        let identity = match self.identity {
            Some(Identity::Guest(guest)) => Identity::Guest(validate_guest(guest)?),
            Some(identity) => identity,
            None => return Err(BookingError::validation("guest", "is required when not signed in")),
        };

        Ok(NewReservation {
            id: Uuid::new_v4(),
            resource_id,
            identity,
            window,
            total_amount,
            notes: non_empty(self.notes),
        })
    }
}

fn parse_instant(field: &'static str, raw: Option<&str>) -> Result<DateTime<Utc>, BookingError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BookingError::validation(field, "is required"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| BookingError::validation(field, "must be an RFC 3339 timestamp"))
}

fn validate_guest(guest: GuestContact) -> Result<GuestContact, BookingError> {
    let name = guest.name.trim().to_string();
    if name.is_empty() {
        return Err(BookingError::validation("guest.name", "is required"));
    }
    let email = guest.email.trim().to_string();
    if email.is_empty() {
        return Err(BookingError::validation("guest.email", "is required"));
    }
    if !email.contains('@') {
        return Err(BookingError::validation("guest.email", "is not an email address"));
    }
    Ok(GuestContact {
        name,
        email,
        phone: non_empty(guest.phone),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub provider_reference: String,
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPaymentRecord {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub provider_reference: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InquiryRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub message: Option<String>,
    pub dog_picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInquiry {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub message: Option<String>,
    pub picture_url: Option<String>,
}

impl InquiryRequest {
    pub fn validate(self) -> Result<NewInquiry, BookingError> {
        let name = non_empty(self.name).ok_or_else(|| BookingError::validation("name", "is required"))?;
        let email = non_empty(self.email).ok_or_else(|| BookingError::validation("email", "is required"))?;
        let phone = non_empty(self.phone).ok_or_else(|| BookingError::validation("phone", "is required"))?;
        let start_date = self
            .start_date
            .ok_or_else(|| BookingError::validation("start_date", "is required"))?;
        let end_date = self
            .end_date
            .ok_or_else(|| BookingError::validation("end_date", "is required"))?;
        if end_date < start_date {
            return Err(BookingError::validation("end_date", "must not be before start_date"));
        }

        Ok(NewInquiry {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            start_date,
            end_date,
            message: non_empty(self.message),
            picture_url: non_empty(self.dog_picture_url),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    InquiryReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingCreated => "BookingCreated",
            NotificationKind::BookingConfirmed => "BookingConfirmed",
            NotificationKind::BookingCancelled => "BookingCancelled",
            NotificationKind::InquiryReceived => "InquiryReceived",
        }
    }

    /// Notification emitted when a reservation enters `status`.
    pub fn for_status(status: ReservationStatus) -> Option<Self> {
        match status {
            ReservationStatus::Pending => Some(NotificationKind::BookingCreated),
            ReservationStatus::Confirmed => Some(NotificationKind::BookingConfirmed),
            ReservationStatus::Cancelled => Some(NotificationKind::BookingCancelled),
            ReservationStatus::Completed => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn for_reservation(kind: NotificationKind, reservation: &Reservation) -> Self {
        let (account_id, contact_email) = match &reservation.identity {
            Identity::Authenticated { account_id } => (Some(*account_id), None),
            Identity::Guest(guest) => (None, Some(guest.email.clone())),
        };
        Self::new(
            kind,
            reservation.id,
            serde_json::json!({
                "booking_id": reservation.id,
                "service_id": reservation.resource_id,
                "start_time": reservation.start,
                "end_time": reservation.end,
                "status": reservation.status,
                "account_id": account_id,
                "contact_email": contact_email,
            }),
        )
    }

    pub fn for_inquiry(inquiry: &NewInquiry) -> Self {
        Self::new(
            NotificationKind::InquiryReceived,
            inquiry.id,
            serde_json::json!({
                "inquiry_id": inquiry.id,
                "name": inquiry.name,
                "email": inquiry.email,
                "phone": inquiry.phone,
                "start_date": inquiry.start_date,
                "end_date": inquiry.end_date,
            }),
        )
    }

    fn new(kind: NotificationKind, aggregate_id: Uuid, event_data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            event_type: kind.as_str().to_string(),
            event_data,
            processed: false,
            created_at: Utc::now(),
        }
    }
}

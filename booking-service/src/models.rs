use anyhow::anyhow;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct DbBooking {
    pub id: Uuid,
    pub service_id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub total_amount: BigDecimal,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBooking {
    pub id: Uuid,
    pub service_id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub total_amount: BigDecimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::payments)]
pub struct DbPayment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub stripe_payment_intent_id: String,
    pub amount: BigDecimal,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub stripe_payment_intent_id: String,
    pub amount: BigDecimal,
    pub status: String,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::services)]
pub struct DbService {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub duration_hours: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::users)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::inquiries)]
pub struct NewDbInquiry {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub message: Option<String>,
    pub dog_picture_url: Option<String>,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

impl TryFrom<DbBooking> for Reservation {
    type Error = anyhow::Error;

    fn try_from(row: DbBooking) -> Result<Self, Self::Error> {
        let identity = match (row.user_id, row.guest_name, row.guest_email) {
            (Some(account_id), _, _) => Identity::Authenticated { account_id },
            (None, Some(name), Some(email)) => Identity::Guest(GuestContact {
                name,
                email,
                phone: row.guest_phone,
            }),
            _ => return Err(anyhow!("booking {} has no requester", row.id)),
        };
        let created_at = row.created_at.unwrap_or_else(Utc::now);

        Ok(Self {
            id: row.id,
            resource_id: row.service_id,
            identity,
            start: row.start_time,
            end: row.end_time,
            status: row.status.parse()?,
            total_amount: row.total_amount,
            notes: row.notes,
            created_at,
            updated_at: row.updated_at.unwrap_or(created_at),
        })
    }
}

impl From<&NewReservation> for NewBooking {
    fn from(new: &NewReservation) -> Self {
        let (user_id, guest) = match &new.identity {
            Identity::Authenticated { account_id } => (Some(*account_id), None),
            Identity::Guest(guest) => (None, Some(guest.clone())),
        };
        Self {
            id: new.id,
            service_id: new.resource_id,
            user_id,
            guest_name: guest.as_ref().map(|g| g.name.clone()),
            guest_email: guest.as_ref().map(|g| g.email.clone()),
            guest_phone: guest.and_then(|g| g.phone),
            start_time: new.window.start,
            end_time: new.window.end,
            status: ReservationStatus::Pending.as_str().to_string(),
            total_amount: new.total_amount.clone(),
            notes: new.notes.clone(),
        }
    }
}

impl TryFrom<DbPayment> for PaymentRecord {
    type Error = anyhow::Error;

    fn try_from(row: DbPayment) -> Result<Self, Self::Error> {
        let created_at = row.created_at.unwrap_or_else(Utc::now);
        Ok(Self {
            id: row.id,
            reservation_id: row.booking_id,
            provider_reference: row.stripe_payment_intent_id,
            amount: row.amount,
            status: row.status.parse()?,
            created_at,
            updated_at: row.updated_at.unwrap_or(created_at),
        })
    }
}

impl From<&NewPaymentRecord> for NewPayment {
    fn from(new: &NewPaymentRecord) -> Self {
        Self {
            id: new.id,
            booking_id: new.reservation_id,
            stripe_payment_intent_id: new.provider_reference.clone(),
            amount: new.amount.clone(),
            status: PaymentStatus::Pending.as_str().to_string(),
        }
    }
}

impl From<DbService> for Resource {
    fn from(row: DbService) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            duration_hours: row.duration_hours,
        }
    }
}

impl From<DbUser> for Account {
    fn from(row: DbUser) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            customer_ref: row.stripe_customer_id,
        }
    }
}

impl From<&NewInquiry> for NewDbInquiry {
    fn from(inquiry: &NewInquiry) -> Self {
        Self {
            id: inquiry.id,
            name: inquiry.name.clone(),
            email: inquiry.email.clone(),
            phone: inquiry.phone.clone(),
            start_date: inquiry.start_date,
            end_date: inquiry.end_date,
            message: inquiry.message.clone(),
            dog_picture_url: inquiry.picture_url.clone(),
        }
    }
}

impl From<&OutboxEvent> for NewOutboxEvent {
    fn from(event: &OutboxEvent) -> Self {
        Self {
            id: event.id,
            aggregate_id: event.aggregate_id,
            event_type: event.event_type.clone(),
            event_data: event.event_data.clone(),
        }
    }
}

//! In-process store used by the test suites. One mutex guards all state, so
//! the conflict scan and the insert in `commit_reservation` are atomic.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::*;

#[derive(Default)]
struct State {
    resources: HashMap<Uuid, Resource>,
    accounts: HashMap<Uuid, Account>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    reservations: Vec<Reservation>,
    payments: Vec<PaymentRecord>,
    inquiries: Vec<NewInquiry>,
    outbox: Vec<OutboxEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    latency: std::sync::Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_resource(&self, name: &str, price: i32) -> Resource {
        let resource = Resource {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            price: price.into(),
            duration_hours: 24,
        };
        self.state
            .lock()
            .await
            .resources
            .insert(resource.id, resource.clone());
        resource
    }

    /// Registers an account with a live session token.
    pub async fn add_account(&self, email: &str, token: &str) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: None,
            phone: None,
            customer_ref: None,
        };
        let mut state = self.state.lock().await;
        state.accounts.insert(account.id, account.clone());
        state.sessions.insert(
            token.to_string(),
            (account.id, Utc::now() + chrono::Duration::hours(1)),
        );
        account
    }

    /// Inserts a reservation as-is, bypassing the conflict check.
    pub async fn seed_reservation(&self, reservation: Reservation) {
        self.state.lock().await.reservations.push(reservation);
    }

    /// Every call fails while set, like an unreachable database.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    pub async fn reservation(&self, id: Uuid) -> Option<Reservation> {
        let state = self.state.lock().await;
        state.reservations.iter().find(|r| r.id == id).cloned()
    }

    pub async fn reservations(&self) -> Vec<Reservation> {
        self.state.lock().await.reservations.clone()
    }

    pub async fn payment(&self, provider_reference: &str) -> Option<PaymentRecord> {
        let state = self.state.lock().await;
        state
            .payments
            .iter()
            .find(|p| p.provider_reference == provider_reference)
            .cloned()
    }

    pub async fn outbox_types(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.outbox.iter().map(|e| e.event_type.clone()).collect()
    }

    pub async fn inquiry_count(&self) -> usize {
        self.state.lock().await.inquiries.len()
    }

    async fn enter(&self) -> Result<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }
}

fn write_reservation_status(
    state: &mut State,
    id: Uuid,
    target: ReservationStatus,
) -> Option<Reservation> {
    let reservation = state.reservations.iter_mut().find(|r| r.id == id)?;
    if reservation.status.can_transition_to(target) {
        reservation.status = target;
        reservation.updated_at = Utc::now();
        let updated = reservation.clone();
        if let Some(kind) = NotificationKind::for_status(target) {
            state.outbox.push(OutboxEvent::for_reservation(kind, &updated));
        }
        return Some(updated);
    }
    Some(reservation.clone())
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn active_reservations(
        &self,
        resource_id: Uuid,
        _window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Reservation>> {
        self.enter().await?;
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .iter()
            .filter(|r| r.resource_id == resource_id && r.status.is_active())
            .filter(|r| Some(r.id) != exclude)
            .cloned()
            .collect())
    }

    async fn commit_reservation(&self, new: NewReservation) -> Result<CommitOutcome> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        let conflicts = find_conflicts(&state.reservations, new.resource_id, &new.window, None);
        if !conflicts.is_empty() {
            return Ok(CommitOutcome::Conflict(conflicts));
        }

        let reservation = new.into_pending(Utc::now());
        state.outbox.push(OutboxEvent::for_reservation(
            NotificationKind::BookingCreated,
            &reservation,
        ));
        state.reservations.push(reservation.clone());
        Ok(CommitOutcome::Committed(reservation))
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        self.enter().await?;
        Ok(self.reservation(id).await)
    }

    async fn reservations_for_account(&self, account_id: Uuid) -> Result<Vec<Reservation>> {
        self.enter().await?;
        let state = self.state.lock().await;
        let mut owned: Vec<Reservation> = state
            .reservations
            .iter()
            .filter(|r| r.identity.account_id() == Some(account_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn transition_reservation(
        &self,
        id: Uuid,
        target: ReservationStatus,
    ) -> Result<Option<Reservation>> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        Ok(write_reservation_status(&mut state, id, target))
    }

    async fn insert_payment(&self, new: NewPaymentRecord) -> Result<PaymentRecord> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        if state
            .payments
            .iter()
            .any(|p| p.provider_reference == new.provider_reference)
        {
            return Err(anyhow!("duplicate provider reference {}", new.provider_reference));
        }
        let now = Utc::now();
        let payment = PaymentRecord {
            id: new.id,
            reservation_id: new.reservation_id,
            provider_reference: new.provider_reference,
            amount: new.amount,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, provider_reference: &str) -> Result<Option<PaymentRecord>> {
        self.enter().await?;
        Ok(self.payment(provider_reference).await)
    }

    async fn apply_payment_transition(
        &self,
        payment_id: Uuid,
        transition: Transition,
    ) -> Result<PaymentTransition> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        let payment = state
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| anyhow!("payment {} vanished", payment_id))?;
        if payment.status.can_transition_to(transition.payment) {
            payment.status = transition.payment;
            payment.updated_at = Utc::now();
        }
        let payment = payment.clone();

        let paid = state
            .payments
            .iter()
            .any(|p| p.reservation_id == payment.reservation_id && p.status == PaymentStatus::Succeeded);
        let reservation = match transition.reservation {
            Some(ReservationStatus::Cancelled) if paid => None,
            Some(target) if payment.status == transition.payment => {
                write_reservation_status(&mut state, payment.reservation_id, target)
            }
            _ => None,
        };
        Ok(PaymentTransition { payment, reservation })
    }

    async fn insert_inquiry(&self, inquiry: NewInquiry) -> Result<()> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        state.outbox.push(OutboxEvent::for_inquiry(&inquiry));
        state.inquiries.push(inquiry);
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn get_resource(&self, id: Uuid) -> Result<Option<Resource>> {
        self.enter().await?;
        Ok(self.state.lock().await.resources.get(&id).cloned())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.enter().await?;
        let state = self.state.lock().await;
        let mut resources: Vec<Resource> = state.resources.values().cloned().collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }
}

#[async_trait]
impl IdentityResolver for MemoryStore {
    async fn resolve_identity(&self, token: &str) -> Result<Option<Uuid>> {
        self.enter().await?;
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .get(token)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(account_id, _)| *account_id))
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        self.enter().await?;
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn save_customer_ref(&self, account_id: Uuid, customer_ref: &str) -> Result<()> {
        self.enter().await?;
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow!("account {} vanished", account_id))?;
        account.customer_ref = Some(customer_ref.to_string());
        Ok(())
    }
}

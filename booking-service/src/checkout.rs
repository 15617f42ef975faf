use anyhow::Result;
use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;
use serde::Serialize;
use shared::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::payment::{CustomerDetails, PaymentProvider};
use crate::store::{bounded_commit, bounded_lookup, IdentityResolver, ReservationStore, StoreTimeouts};

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub amount: BigDecimal,
}

/// Opens a payment attempt for a pending reservation. The outcome arrives
/// later through the webhook and the status reconciler.
pub struct Checkout {
    store: Arc<dyn ReservationStore>,
    accounts: Arc<dyn IdentityResolver>,
    provider: Arc<dyn PaymentProvider>,
    timeouts: StoreTimeouts,
}

/// Converts a decimal total into the provider's smallest currency unit.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount.clone() * BigDecimal::from(100)).round(0).to_i64()
}

impl Checkout {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        accounts: Arc<dyn IdentityResolver>,
        provider: Arc<dyn PaymentProvider>,
        timeouts: StoreTimeouts,
    ) -> Self {
        Self {
            store,
            accounts,
            provider,
            timeouts,
        }
    }

    pub async fn start_payment(&self, reservation_id: Uuid, caller: Option<Uuid>) -> Result<CheckoutSession, BookingError> {
        let reservation = bounded_lookup(
            self.timeouts.lookup,
            "get_reservation",
            self.store.get_reservation(reservation_id),
        )
        .await?
        .filter(|r| r.identity.permits(caller))
        .ok_or_else(|| BookingError::not_found("booking", reservation_id))?;

        if reservation.status != ReservationStatus::Pending {
            return Err(BookingError::validation(
                "booking_id",
                format!("booking is {} and cannot be paid", reservation.status),
            ));
        }
        let amount_minor = to_minor_units(&reservation.total_amount)
            .filter(|minor| *minor > 0)
            .ok_or_else(|| BookingError::validation("total_amount", "cannot be charged"))?;

        let customer_ref = self.customer_for(&reservation.identity).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("booking_id".to_string(), reservation.id.to_string());
        metadata.insert("service_id".to_string(), reservation.resource_id.to_string());
        let intent = bounded_commit(
            self.timeouts.commit,
            "create_payment_intent",
            self.provider.create_payment_intent(amount_minor, &customer_ref, &metadata),
        )
        .await?;

        let payment = bounded_commit(
            self.timeouts.commit,
            "insert_payment",
            self.store.insert_payment(NewPaymentRecord {
                id: Uuid::new_v4(),
                reservation_id: reservation.id,
                provider_reference: intent.intent_id.clone(),
                amount: reservation.total_amount.clone(),
            }),
        )
        .await?;

        info!(
            "Payment attempt {} ({}) opened for booking {}",
            payment.id, payment.provider_reference, reservation.id
        );
        Ok(CheckoutSession {
            client_secret: intent.client_secret,
            payment_intent_id: intent.intent_id,
            amount: payment.amount,
        })
    }

    /// Account requesters keep one provider customer across attempts; guests
    /// get a fresh one per attempt.
    async fn customer_for(&self, identity: &Identity) -> Result<String, BookingError> {
        let (details, account_id) = match identity {
            Identity::Authenticated { account_id } => {
                let account = bounded_lookup(
                    self.timeouts.lookup,
                    "get_account",
                    self.accounts.get_account(*account_id),
                )
                .await?
                .ok_or_else(|| BookingError::not_found("account", account_id))?;
                if let Some(customer_ref) = account.customer_ref {
                    return Ok(customer_ref);
                }
                let details = CustomerDetails {
                    email: account.email,
                    name: account.name,
                    phone: account.phone,
                };
                (details, Some(*account_id))
            }
            Identity::Guest(guest) => {
                let details = CustomerDetails {
                    email: guest.email.clone(),
                    name: Some(guest.name.clone()),
                    phone: guest.phone.clone(),
                };
                (details, None)
            }
        };

        let customer_ref = bounded_commit(
            self.timeouts.commit,
            "create_customer",
            self.provider.create_customer(&details),
        )
        .await?;

        if let Some(account_id) = account_id {
            bounded_commit(
                self.timeouts.commit,
                "save_customer_ref",
                self.accounts.save_customer_ref(account_id, &customer_ref),
            )
            .await?;
        }
        Ok(customer_ref)
    }
}

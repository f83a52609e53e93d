//! Parcel state transitions and who may trigger them.
//!
//! Validators never touch the parcel. They return a [`ParcelTransition`]
//! describing the change and its side effect; callers apply it (locally or by
//! issuing the matching backend request) only once it was accepted.

use thiserror::Error;
use time::OffsetDateTime;

use super::entities::{
    AssignedRider, Parcel, ParcelStatus, PaymentRecord, PaymentStatus, RecordId, Rider,
};

/// Who is asking for the change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Actor {
    Customer { email: String },
    Admin,
    PaymentCallback,
}

impl Actor {
    pub fn customer(email: impl Into<String>) -> Self {
        Actor::Customer {
            email: email.into(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Actor::Customer { .. } => "customer",
            Actor::Admin => "admin",
            Actor::PaymentCallback => "payment callback",
        }
    }
}

/// Proof of a successful charge, as reported by the payment processor.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentConfirmation {
    pub payment_intent_id: String,
    pub amount: f64,
    pub paid_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SideEffect {
    None,
    RecordPayment(PaymentRecord),
    AttachRider(AssignedRider),
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParcelTransition {
    pub from: ParcelStatus,
    pub to: ParcelStatus,
    pub effect: SideEffect,
    /// Retry of a transition that already happened; nothing to do.
    pub unchanged: bool,
}

impl ParcelTransition {
    fn change(from: ParcelStatus, to: ParcelStatus, effect: SideEffect) -> Self {
        Self {
            from,
            to,
            effect,
            unchanged: false,
        }
    }

    fn unchanged(status: ParcelStatus) -> Self {
        Self {
            from: status,
            to: status,
            effect: SideEffect::None,
            unchanged: true,
        }
    }

    /// Mirror the accepted transition onto a local copy of the parcel.
    pub fn apply(&self, parcel: &mut Parcel) {
        if self.unchanged {
            return;
        }
        parcel.status = self.to;
        match &self.effect {
            SideEffect::RecordPayment(record) => {
                parcel.payment_status = PaymentStatus::Paid;
                parcel.payment_intent_id = Some(record.payment_intent_id.clone());
                parcel.payment_date = Some(record.date);
            }
            SideEffect::AttachRider(rider) => {
                parcel.assigned_rider = Some(rider.clone());
            }
            SideEffect::None | SideEffect::Delete => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("{actor} may not {action}")]
    NotPermitted {
        actor: &'static str,
        action: &'static str,
    },
    #[error("parcel is {0}; only pending parcels can be paid")]
    NotPending(ParcelStatus),
    #[error("parcel was already paid with a different payment")]
    AlreadyPaid,
    #[error("payment confirmation is missing a payment reference")]
    MissingPaymentReference,
    #[error("payment amount must be positive")]
    InvalidAmount,
    #[error("There are no active riders available for assignment.")]
    NoActiveRiders,
    #[error("parcel is {0}; only paid parcels can be assigned")]
    NotPaid(ParcelStatus),
    #[error("parcel already has an assigned rider")]
    AlreadyAssigned,
    #[error("rider is not active")]
    RiderNotActive,
    #[error("parcel has not been saved yet")]
    MissingId,
    #[error("parcel with an assigned rider cannot be deleted")]
    DeleteAfterAssignment,
    #[error("cannot move parcel from {from} to {to}")]
    InvalidProgression { from: ParcelStatus, to: ParcelStatus },
    #[error("parcel is already {0}")]
    Terminal(ParcelStatus),
}

/// `pending -> paid`, issued only by the payment callback.
pub fn confirm_payment(
    parcel: &Parcel,
    confirmation: &PaymentConfirmation,
    actor: &Actor,
) -> Result<ParcelTransition, TransitionError> {
    if *actor != Actor::PaymentCallback {
        return Err(TransitionError::NotPermitted {
            actor: actor.label(),
            action: "confirm a payment",
        });
    }

    let reference = confirmation.payment_intent_id.trim();
    if reference.is_empty() {
        return Err(TransitionError::MissingPaymentReference);
    }
    if !(confirmation.amount.is_finite() && confirmation.amount > 0.0) {
        return Err(TransitionError::InvalidAmount);
    }

    if parcel.payment_status == PaymentStatus::Paid || parcel.status != ParcelStatus::Pending {
        return match parcel.payment_intent_id.as_deref() {
            Some(existing) if existing == reference => Ok(ParcelTransition::unchanged(parcel.status)),
            Some(_) => Err(TransitionError::AlreadyPaid),
            None if parcel.payment_status == PaymentStatus::Paid => {
                Err(TransitionError::AlreadyPaid)
            }
            None => Err(TransitionError::NotPending(parcel.status)),
        };
    }

    let parcel_id = parcel.id.clone().ok_or(TransitionError::MissingId)?;
    let record = PaymentRecord {
        id: None,
        parcel_id,
        payment_intent_id: reference.to_string(),
        amount: confirmation.amount,
        payment_status: PaymentStatus::Paid,
        date: confirmation.paid_at,
        user_email: Some(parcel.user_email.clone()),
        parcel_title: parcel.title.clone(),
        parcel_tracking_number: parcel.tracking_number.clone(),
        sender_name: parcel.sender_name.clone(),
        receiver_name: parcel.receiver_name.clone(),
        sender_region: parcel.sender_region.clone(),
        receiver_region: parcel.receiver_region.clone(),
    };

    Ok(ParcelTransition::change(
        ParcelStatus::Pending,
        ParcelStatus::Paid,
        SideEffect::RecordPayment(record),
    ))
}

/// `paid -> assigned`, admin only, against the active riders known right now.
pub fn assign_rider(
    parcel: &Parcel,
    rider_id: &str,
    active_riders: &[Rider],
    actor: &Actor,
    at: OffsetDateTime,
) -> Result<ParcelTransition, TransitionError> {
    if *actor != Actor::Admin {
        return Err(TransitionError::NotPermitted {
            actor: actor.label(),
            action: "assign riders",
        });
    }
    if active_riders.iter().all(|rider| !rider.is_active()) {
        return Err(TransitionError::NoActiveRiders);
    }
    if parcel.status != ParcelStatus::Paid || parcel.payment_status != PaymentStatus::Paid {
        return Err(TransitionError::NotPaid(parcel.status));
    }
    if parcel.assigned_rider.is_some() {
        return Err(TransitionError::AlreadyAssigned);
    }

    let rider = active_riders
        .iter()
        .find(|rider| rider.id.as_deref() == Some(rider_id))
        .filter(|rider| rider.is_active())
        .ok_or(TransitionError::RiderNotActive)?;

    let assignment = AssignedRider::from_rider(RecordId::from(rider_id), rider, at);
    Ok(ParcelTransition::change(
        ParcelStatus::Paid,
        ParcelStatus::Assigned,
        SideEffect::AttachRider(assignment),
    ))
}

/// Owners (and admins) may delete a booking until a rider is attached.
pub fn authorize_delete(parcel: &Parcel, actor: &Actor) -> Result<ParcelTransition, TransitionError> {
    match actor {
        Actor::Customer { email } if parcel.is_owned_by(email) => {}
        Actor::Admin => {}
        other => {
            return Err(TransitionError::NotPermitted {
                actor: other.label(),
                action: "delete this parcel",
            })
        }
    }
    if parcel.id.is_none() {
        return Err(TransitionError::MissingId);
    }
    if parcel.assigned_rider.is_some() {
        return Err(TransitionError::DeleteAfterAssignment);
    }
    Ok(ParcelTransition::change(
        parcel.status,
        parcel.status,
        SideEffect::Delete,
    ))
}

/// Checked before any money moves: only the owner may pay, and only for a
/// `pending`, unpaid parcel.
pub fn authorize_payment(parcel: &Parcel, actor: &Actor) -> Result<(), TransitionError> {
    match actor {
        Actor::Customer { email } if parcel.is_owned_by(email) => {}
        other => {
            return Err(TransitionError::NotPermitted {
                actor: other.label(),
                action: "pay for this parcel",
            })
        }
    }
    if parcel.id.is_none() {
        return Err(TransitionError::MissingId);
    }
    if parcel.payment_status == PaymentStatus::Paid {
        return Err(TransitionError::AlreadyPaid);
    }
    if parcel.status != ParcelStatus::Pending {
        return Err(TransitionError::NotPending(parcel.status));
    }
    Ok(())
}

/// One step along `assigned -> processing -> ... -> delivered`.
pub fn advance(
    parcel: &Parcel,
    next: ParcelStatus,
    actor: &Actor,
) -> Result<ParcelTransition, TransitionError> {
    if *actor != Actor::Admin {
        return Err(TransitionError::NotPermitted {
            actor: actor.label(),
            action: "update delivery progress",
        });
    }
    if parcel.status == next {
        return Ok(ParcelTransition::unchanged(next));
    }
    if parcel.status.is_terminal() {
        return Err(TransitionError::Terminal(parcel.status));
    }
    if parcel.assigned_rider.is_none() || parcel.status.next_delivery_step() != Some(next) {
        return Err(TransitionError::InvalidProgression {
            from: parcel.status,
            to: next,
        });
    }
    Ok(ParcelTransition::change(parcel.status, next, SideEffect::None))
}

/// Any status before `delivered` may be cancelled by the owner or an admin.
pub fn cancel(parcel: &Parcel, actor: &Actor) -> Result<ParcelTransition, TransitionError> {
    match actor {
        Actor::Customer { email } if parcel.is_owned_by(email) => {}
        Actor::Admin => {}
        other => {
            return Err(TransitionError::NotPermitted {
                actor: other.label(),
                action: "cancel this parcel",
            })
        }
    }
    match parcel.status {
        ParcelStatus::Cancelled => Ok(ParcelTransition::unchanged(ParcelStatus::Cancelled)),
        ParcelStatus::Delivered => Err(TransitionError::Terminal(ParcelStatus::Delivered)),
        from => Ok(ParcelTransition::change(
            from,
            ParcelStatus::Cancelled,
            SideEffect::None,
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("unpaid parcel {0} carries an assigned rider")]
    RiderBeforePayment(String),
    #[error("parcel {0} is assigned but has no rider")]
    AssignedWithoutRider(String),
    #[error("parcel {0} is marked paid but its status is pending")]
    PaidButPending(String),
}

/// Structural checks on a parcel received from the backend.
pub fn check_invariants(parcel: &Parcel) -> Result<(), InvariantViolation> {
    let code = || parcel.tracking_number.clone();
    let unpaid =
        parcel.status == ParcelStatus::Pending || parcel.payment_status == PaymentStatus::Unpaid;
    if unpaid && parcel.assigned_rider.is_some() {
        return Err(InvariantViolation::RiderBeforePayment(code()));
    }
    if parcel.status == ParcelStatus::Assigned && parcel.assigned_rider.is_none() {
        return Err(InvariantViolation::AssignedWithoutRider(code()));
    }
    if parcel.status == ParcelStatus::Pending && parcel.payment_status == PaymentStatus::Paid {
        return Err(InvariantViolation::PaidButPending(code()));
    }
    Ok(())
}

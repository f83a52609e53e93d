use thiserror::Error;

use super::entities::{Parcel, Rider, RiderStatus};
use super::lifecycle::Actor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiderAction {
    /// `pending -> active`
    Approve,
    /// `active -> pending`
    Revoke,
    /// `pending | active -> deleted`, permanent.
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiderOutcome {
    Status(RiderStatus),
    Deleted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RiderTransition<'a> {
    pub from: RiderStatus,
    pub outcome: RiderOutcome,
    /// In-flight parcels that stay assigned to the rider after a revoke or
    /// reject. They are reported, never detached.
    pub stranded_parcels: Vec<&'a Parcel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiderTransitionError {
    #[error("only admins manage riders")]
    NotPermitted,
    #[error("rider is already {0}")]
    AlreadyInStatus(RiderStatus),
}

pub fn transition<'a>(
    rider: &Rider,
    action: RiderAction,
    actor: &Actor,
    parcels: &'a [Parcel],
) -> Result<RiderTransition<'a>, RiderTransitionError> {
    if *actor != Actor::Admin {
        return Err(RiderTransitionError::NotPermitted);
    }

    let outcome = match (rider.status, action) {
        (RiderStatus::Pending, RiderAction::Approve) => RiderOutcome::Status(RiderStatus::Active),
        (RiderStatus::Active, RiderAction::Revoke) => RiderOutcome::Status(RiderStatus::Pending),
        (_, RiderAction::Reject) => RiderOutcome::Deleted,
        (status, RiderAction::Approve) | (status, RiderAction::Revoke) => {
            return Err(RiderTransitionError::AlreadyInStatus(status))
        }
    };

    let stranded_parcels = match outcome {
        RiderOutcome::Status(RiderStatus::Active) => Vec::new(),
        RiderOutcome::Status(RiderStatus::Pending) | RiderOutcome::Deleted => {
            in_flight_parcels(rider, parcels)
        }
    };

    Ok(RiderTransition {
        from: rider.status,
        outcome,
        stranded_parcels,
    })
}

/// Riders the assignment selector may offer.
pub fn active_riders(riders: &[Rider]) -> Vec<Rider> {
    riders.iter().filter(|rider| rider.is_active()).cloned().collect()
}

/// Undelivered parcels currently carried by `rider`.
pub fn in_flight_parcels<'a>(rider: &Rider, parcels: &'a [Parcel]) -> Vec<&'a Parcel> {
    let Some(rider_id) = rider.id.as_deref() else {
        return Vec::new();
    };
    parcels
        .iter()
        .filter(|parcel| !parcel.status.is_terminal())
        .filter(|parcel| {
            parcel
                .assigned_rider
                .as_ref()
                .map(|assigned| assigned.rider_id == rider_id)
                .unwrap_or(false)
        })
        .collect()
}

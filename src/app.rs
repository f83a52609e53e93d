//! User-facing flows. Each one awaits its steps in order and stops at the
//! first hard failure; soft failures ride along on the outcome.

use thiserror::Error;
use time::OffsetDateTime;
use validator::{Validate, ValidationErrors};

use crate::domain::{
    lifecycle, riders, roles, tracking_step_index, Actor, AuthUser, Parcel, ParcelDraft,
    PaymentConfirmation, PaymentRecord, PaymentSummary, Redirect, Registration, Rider,
    RiderAction, RiderApplication, RiderOutcome, RiderStatus, RiderTransitionError, Role,
    RoleError, RoleGate, RoleResolution, Session, SideEffect, TransitionError,
};
use crate::infra::{
    api::{ApiClient, ApiError},
    identity::{IdentityError, IdentityProvider, OAuthProvider},
    payments::{BillingDetails, IntentStatus, PaymentFailure, PaymentProcessor},
};
use crate::util::TrackingCode;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] IdentityError),
    #[error("please sign in to continue")]
    SignInRequired,
    #[error(transparent)]
    Role(#[from] RoleError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Rider(#[from] RiderTransitionError),
    #[error(transparent)]
    Payment(#[from] PaymentFailure),
    #[error("payment did not complete (status: {0:?})")]
    PaymentIncomplete(IntentStatus),
}

impl AppError {
    /// Where the UI should navigate in response to this error, if anywhere.
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            AppError::SignInRequired | AppError::Api(ApiError::Unauthorized) => {
                Some(Redirect::Login)
            }
            AppError::Api(ApiError::Forbidden) | AppError::Role(RoleError::AdminRequired) => {
                Some(Redirect::Forbidden)
            }
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Let the session react to auth-related statuses.
fn react_to_status(session: &mut Session, err: &ApiError) {
    if let Some(redirect) = err.status_code().and_then(|code| session.on_status(code)) {
        tracing::info!(session = %session.id, redirect = redirect.path(), "backend refused the session");
    }
}

fn backend_error(session: &mut Session, err: ApiError) -> AppError {
    react_to_status(session, &err);
    AppError::Api(err)
}

fn signed_in_user(session: &Session) -> Result<AuthUser, AppError> {
    match session.user() {
        Some(user) if session.is_signed_in() => Ok(user.clone()),
        _ => Err(AppError::SignInRequired),
    }
}

fn require_admin(session: &Session) -> Result<(), AppError> {
    if !session.is_signed_in() {
        return Err(AppError::SignInRequired);
    }
    RoleGate::require_admin(session.role())?;
    Ok(())
}

// ---- authentication ------------------------------------------------------

#[derive(Debug)]
pub struct RegistrationOutcome {
    pub session: Session,
    /// Set when the account exists but its display name or photo did not stick.
    pub profile_warning: Option<String>,
    /// Set when the backend account record could not be written.
    pub record_warning: Option<String>,
}

pub async fn register_account(
    identity: &dyn IdentityProvider,
    api: &ApiClient,
    form: Registration,
) -> Result<RegistrationOutcome, AppError> {
    form.validate()?;

    let mut user = identity.create_user(form.email.trim(), &form.password).await?;
    tracing::info!(email = %user.email, "account created");

    let name = form.name.trim();
    let photo = form.photo_url.as_deref().filter(|url| !url.trim().is_empty());
    let profile_warning = match identity.update_profile(name, photo).await {
        Ok(()) => {
            user.display_name = Some(name.to_string());
            user.photo_url = photo.map(str::to_string);
            None
        }
        Err(err) => {
            tracing::warn!(email = %user.email, error = %err, "profile update failed after sign-up");
            Some(err.to_string())
        }
    };

    let record_warning = save_account_record(api, &user).await;
    let mut session = Session::start(user);
    resolve_session_role(api, &mut session).await;

    Ok(RegistrationOutcome {
        session,
        profile_warning,
        record_warning,
    })
}

pub async fn sign_in_with_password(
    identity: &dyn IdentityProvider,
    api: &ApiClient,
    email: &str,
    password: &str,
) -> Result<Session, AppError> {
    let user = identity.sign_in_with_password(email.trim(), password).await?;
    establish_session(api, user).await
}

pub async fn sign_in_with_oauth(
    identity: &dyn IdentityProvider,
    api: &ApiClient,
    provider: OAuthProvider,
) -> Result<Session, AppError> {
    let user = identity.sign_in_with_oauth(provider).await?;
    establish_session(api, user).await
}

async fn establish_session(api: &ApiClient, user: AuthUser) -> Result<Session, AppError> {
    tracing::info!(email = %user.email, provider = ?user.provider, "signed in");
    save_account_record(api, &user).await;
    let mut session = Session::start(user);
    resolve_session_role(api, &mut session).await;
    Ok(session)
}

async fn save_account_record(api: &ApiClient, user: &AuthUser) -> Option<String> {
    match api.save_user(&user.to_user()).await {
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(email = %user.email, error = %err, "could not save account record");
            Some(err.user_message())
        }
    }
}

pub async fn sign_out(
    identity: &dyn IdentityProvider,
    api: &ApiClient,
    session: &mut Session,
) -> Result<(), AppError> {
    identity.sign_out().await?;
    api.clear_cache().await;
    session.invalidate();
    tracing::info!(session = %session.id, "signed out");
    Ok(())
}

/// Look up the session's role and record it. Failures settle on `Failed`,
/// which every gate treats as the lowest privilege.
pub async fn resolve_session_role(api: &ApiClient, session: &mut Session) -> RoleResolution {
    let resolution = match session.email().map(str::to_string) {
        Some(email) if session.is_signed_in() => api.resolve_role(&email).await,
        _ => RoleResolution::Failed,
    };
    session.set_role(resolution);
    session.role()
}

// ---- parcels -------------------------------------------------------------

pub async fn book_parcel(
    api: &ApiClient,
    session: &mut Session,
    draft: ParcelDraft,
) -> Result<Parcel, AppError> {
    let owner = signed_in_user(session)?;
    draft.validate()?;

    let now = OffsetDateTime::now_utc();
    let mut parcel = draft.into_parcel(&owner, TrackingCode::generate(now), now);
    let id = api
        .create_parcel(&parcel)
        .await
        .map_err(|err| backend_error(session, err))?;
    tracing::info!(
        parcel = %id,
        tracking = %parcel.tracking_number,
        cost = parcel.cost,
        "parcel booked"
    );
    parcel.id = Some(id);
    Ok(parcel)
}

pub async fn delete_parcel(
    api: &ApiClient,
    session: &mut Session,
    parcel_id: &str,
) -> Result<(), AppError> {
    let actor = session.actor().ok_or(AppError::SignInRequired)?;
    let parcel = api
        .get_parcel(parcel_id)
        .await
        .map_err(|err| backend_error(session, err))?;
    lifecycle::authorize_delete(&parcel, &actor)?;

    api.delete_parcel(parcel_id)
        .await
        .map_err(|err| backend_error(session, err))?;
    tracing::info!(parcel = parcel_id, tracking = %parcel.tracking_number, "parcel deleted");
    Ok(())
}

/// The caller's own bookings, newest first.
pub async fn my_parcels(api: &ApiClient, session: &mut Session) -> Result<Vec<Parcel>, AppError> {
    let user = signed_in_user(session)?;
    let mut parcels = api
        .list_parcels(Some(&user.email))
        .await
        .map_err(|err| backend_error(session, err))?;
    parcels.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
    Ok(parcels)
}

#[derive(Clone, Debug)]
pub struct Tracking {
    pub parcel: Parcel,
    /// Index into the tracking steps; `None` for cancelled parcels.
    pub step: Option<usize>,
}

/// Public lookup; no session needed.
pub async fn track_parcel(api: &ApiClient, code: &str) -> Result<Tracking, AppError> {
    let parcel = api.track_parcel(code).await?;
    if let Err(violation) = lifecycle::check_invariants(&parcel) {
        tracing::warn!(%violation, "tracked parcel is inconsistent");
    }
    let step = tracking_step_index(parcel.status);
    Ok(Tracking { parcel, step })
}

// ---- payments ------------------------------------------------------------

#[derive(Debug)]
pub enum PaymentOutcome {
    Paid {
        parcel: Parcel,
        payment_intent_id: String,
    },
    /// The card was charged but the parcel status update failed.
    /// Nothing is rolled back; the parcel still reads as pending.
    PaidStatusPending {
        parcel: Parcel,
        payment_intent_id: String,
        warning: String,
    },
}

impl PaymentOutcome {
    pub fn payment_intent_id(&self) -> &str {
        match self {
            PaymentOutcome::Paid {
                payment_intent_id, ..
            }
            | PaymentOutcome::PaidStatusPending {
                payment_intent_id, ..
            } => payment_intent_id,
        }
    }
}

pub async fn pay_for_parcel(
    api: &ApiClient,
    processor: &dyn PaymentProcessor,
    session: &mut Session,
    parcel_id: &str,
) -> Result<PaymentOutcome, AppError> {
    let payer = signed_in_user(session)?;
    let mut parcel = api
        .get_parcel(parcel_id)
        .await
        .map_err(|err| backend_error(session, err))?;

    lifecycle::authorize_payment(&parcel, &Actor::customer(payer.email.clone()))?;

    let amount_cents = u64::from(parcel.cost) * 100;
    let client_secret = api
        .create_payment_intent(amount_cents, parcel_id)
        .await
        .map_err(|err| backend_error(session, err))?;

    let billing = BillingDetails {
        name: payer.display_name.clone(),
        email: Some(payer.email.clone()),
    };
    let intent = processor
        .confirm_card_payment(&client_secret, &billing)
        .await?;
    if intent.status != IntentStatus::Succeeded {
        tracing::warn!(intent = %intent.id, status = ?intent.status, "payment not completed");
        return Err(AppError::PaymentIncomplete(intent.status));
    }
    tracing::info!(parcel = parcel_id, intent = %intent.id, amount_cents, "card charged");

    let confirmation = PaymentConfirmation {
        payment_intent_id: intent.id.clone(),
        amount: f64::from(parcel.cost),
        paid_at: OffsetDateTime::now_utc(),
    };
    let transition = lifecycle::confirm_payment(&parcel, &confirmation, &Actor::PaymentCallback)?;

    if let Err(err) = api
        .mark_parcel_paid(parcel_id, &payer.email, &confirmation)
        .await
    {
        tracing::warn!(
            parcel = parcel_id,
            intent = %intent.id,
            error = %err,
            "payment succeeded but parcel status update failed"
        );
        let warning = err.user_message();
        react_to_status(session, &err);
        return Ok(PaymentOutcome::PaidStatusPending {
            parcel,
            payment_intent_id: intent.id,
            warning,
        });
    }

    transition.apply(&mut parcel);
    Ok(PaymentOutcome::Paid {
        parcel,
        payment_intent_id: intent.id,
    })
}

#[derive(Clone, Debug)]
pub struct PaymentHistory {
    pub records: Vec<PaymentRecord>,
    pub summary: PaymentSummary,
}

/// Admins see every payment; everyone else sees their own.
pub async fn payment_history(
    api: &ApiClient,
    session: &mut Session,
) -> Result<PaymentHistory, AppError> {
    let user = signed_in_user(session)?;
    let filter = match session.role() {
        RoleResolution::Resolved(Role::Admin) => None,
        _ => Some(user.email),
    };
    let records = api
        .list_payments(filter.as_deref())
        .await
        .map_err(|err| backend_error(session, err))?;
    let summary = PaymentSummary::from_records(&records);
    Ok(PaymentHistory { records, summary })
}

// ---- riders --------------------------------------------------------------

/// Submit a rider application; it waits in `pending` until an admin approves it.
pub async fn apply_as_rider(
    api: &ApiClient,
    session: &mut Session,
    form: RiderApplication,
) -> Result<Rider, AppError> {
    signed_in_user(session)?;
    form.validate()?;

    let mut rider = form.into_rider();
    let id = api
        .submit_rider_application(&rider)
        .await
        .map_err(|err| backend_error(session, err))?;
    tracing::info!(rider = %id, email = %rider.email, "rider application submitted");
    rider.id = Some(id);
    Ok(rider)
}

// ---- admin ---------------------------------------------------------------

pub async fn assign_rider(
    api: &ApiClient,
    session: &mut Session,
    parcel_id: &str,
    rider_id: &str,
) -> Result<Parcel, AppError> {
    require_admin(session)?;

    let mut parcel = api
        .get_parcel(parcel_id)
        .await
        .map_err(|err| backend_error(session, err))?;
    let candidates = api
        .list_riders(Some(RiderStatus::Active))
        .await
        .map_err(|err| backend_error(session, err))?;
    let active = riders::active_riders(&candidates);

    let transition = lifecycle::assign_rider(
        &parcel,
        rider_id,
        &active,
        &Actor::Admin,
        OffsetDateTime::now_utc(),
    )?;
    if let SideEffect::AttachRider(assignment) = &transition.effect {
        api.assign_rider(parcel_id, assignment)
            .await
            .map_err(|err| backend_error(session, err))?;
        tracing::info!(
            parcel = parcel_id,
            rider = %assignment.rider_name,
            "rider assigned"
        );
    }
    transition.apply(&mut parcel);
    Ok(parcel)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RiderUpdate {
    pub outcome: RiderOutcome,
    /// Tracking numbers of undelivered parcels still attached to the rider.
    pub stranded_parcels: Vec<String>,
}

/// Approve or revoke a rider.
pub async fn set_rider_status(
    api: &ApiClient,
    session: &mut Session,
    rider: &Rider,
    action: RiderAction,
) -> Result<RiderUpdate, AppError> {
    require_admin(session)?;
    let rider_id = rider.id.clone().ok_or(TransitionError::MissingId)?;

    let parcels = api
        .list_parcels(None)
        .await
        .map_err(|err| backend_error(session, err))?;
    let transition = riders::transition(rider, action, &Actor::Admin, &parcels)?;
    let stranded_parcels: Vec<String> = transition
        .stranded_parcels
        .iter()
        .map(|parcel| parcel.tracking_number.clone())
        .collect();
    if !stranded_parcels.is_empty() {
        tracing::warn!(
            rider = %rider.display_name(),
            parcels = ?stranded_parcels,
            "rider still carries undelivered parcels"
        );
    }

    let result = match transition.outcome {
        RiderOutcome::Status(status) => api.update_rider_status(&rider_id, status).await,
        RiderOutcome::Deleted => api.delete_rider(&rider_id).await,
    };
    result.map_err(|err| backend_error(session, err))?;
    tracing::info!(rider = %rider.display_name(), outcome = ?transition.outcome, "rider updated");

    Ok(RiderUpdate {
        outcome: transition.outcome,
        stranded_parcels,
    })
}

pub async fn reject_rider(
    api: &ApiClient,
    session: &mut Session,
    rider: &Rider,
) -> Result<RiderUpdate, AppError> {
    set_rider_status(api, session, rider, RiderAction::Reject).await
}

pub async fn change_user_role(
    api: &ApiClient,
    session: &mut Session,
    user_id: &str,
    new_role: Role,
) -> Result<Role, AppError> {
    if !session.is_signed_in() {
        return Err(AppError::SignInRequired);
    }
    let role = roles::authorize_role_change(session.role(), new_role)?;
    api.update_user_role(user_id, role)
        .await
        .map_err(|err| backend_error(session, err))?;
    tracing::info!(user = user_id, %role, "role changed");
    Ok(role)
}

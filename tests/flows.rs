mod common;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};

use profast::app::{self, AppError, PaymentOutcome};
use profast::domain::{
    AssignedRider, AuthUser, Parcel, ParcelDraft, ParcelStatus, ParcelType, PaymentStatus,
    Redirect, Registration, Rider, RiderAction, RiderApplication, RiderOutcome, RiderStatus, Role,
    RoleError, RoleResolution, TransitionError, VehicleType,
};
use profast::infra::{
    api::{ApiClient, ApiError},
    identity::{IdentityError, IdentityProvider, OAuthProvider, TokenSource},
    payments::{BillingDetails, IntentStatus, PaymentFailure, PaymentIntent, PaymentProcessor},
};
use profast::util::TrackingCode;

use common::{
    at, auth_user, paid_parcel, parcel, pending_parcel, rider, serve, session_as, ADMIN, OWNER,
};

const PASSWORD: &str = "Secret1";

// ---- fake backend ----------------------------------------------------------

#[derive(Clone, Default)]
struct Db {
    parcels: Arc<Mutex<HashMap<String, Parcel>>>,
    riders: Arc<Mutex<Vec<Rider>>>,
    users: Arc<Mutex<Vec<Value>>>,
    role_changes: Arc<Mutex<Vec<(String, Value)>>>,
    reads: Arc<AtomicUsize>,
    intents: Arc<AtomicUsize>,
    payment_updates: Arc<Mutex<Vec<Value>>>,
    fail_payment_update: Arc<AtomicBool>,
    expire_sessions: Arc<AtomicBool>,
}

impl Db {
    fn seed(&self, parcel: Parcel) {
        let id = parcel.id.clone().expect("seeded parcel id");
        self.parcels.lock().expect("parcels").insert(id, parcel);
    }

    fn parcel(&self, id: &str) -> Option<Parcel> {
        self.parcels.lock().expect("parcels").get(id).cloned()
    }
}

type Reply = (StatusCode, Json<Value>);

fn ok(body: Value) -> Reply {
    (StatusCode::OK, Json(body))
}

fn not_found() -> Reply {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" })))
}

async fn role(Path(email): Path<String>) -> Reply {
    if email == ADMIN {
        ok(json!({ "success": true, "email": ADMIN, "role": "admin" }))
    } else {
        not_found()
    }
}

async fn save_user(State(db): State<Db>, Json(body): Json<Value>) -> Reply {
    db.users.lock().expect("users").push(body);
    ok(json!({ "success": true, "insertedId": "u1" }))
}

async fn change_role(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    db.role_changes.lock().expect("roles").push((id, body));
    ok(json!({ "modifiedCount": 1 }))
}

async fn list_parcels(
    State(db): State<Db>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    db.reads.fetch_add(1, Ordering::SeqCst);
    if db.expire_sessions.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "token expired" })));
    }
    let parcels: Vec<Parcel> = db
        .parcels
        .lock()
        .expect("parcels")
        .values()
        .filter(|parcel| {
            query
                .get("email")
                .map(|email| parcel.is_owned_by(email))
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    ok(json!(parcels))
}

async fn create_parcel(State(db): State<Db>, Json(mut parcel): Json<Parcel>) -> Reply {
    let id = format!("new-{}", db.parcels.lock().expect("parcels").len() + 1);
    parcel.id = Some(id.clone());
    db.seed(parcel);
    ok(json!({ "acknowledged": true, "insertedId": id }))
}

async fn get_parcel(State(db): State<Db>, Path(id): Path<String>) -> Reply {
    db.reads.fetch_add(1, Ordering::SeqCst);
    match db.parcel(&id) {
        Some(parcel) => ok(json!(parcel)),
        None => not_found(),
    }
}

async fn delete_parcel(State(db): State<Db>, Path(id): Path<String>) -> Reply {
    let removed = db.parcels.lock().expect("parcels").remove(&id);
    ok(json!({ "deletedCount": usize::from(removed.is_some()) }))
}

async fn track(State(db): State<Db>, Path(code): Path<String>) -> Reply {
    let found = db
        .parcels
        .lock()
        .expect("parcels")
        .values()
        .find(|parcel| parcel.tracking_number == code)
        .cloned();
    match found {
        Some(parcel) => ok(json!({ "success": true, "data": parcel })),
        None => not_found(),
    }
}

async fn mark_paid(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    if db.fail_payment_update.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Failed to update parcel status" })),
        );
    }
    db.payment_updates
        .lock()
        .expect("payment updates")
        .push(body.clone());
    let mut parcels = db.parcels.lock().expect("parcels");
    let Some(parcel) = parcels.get_mut(&id) else {
        return not_found();
    };
    parcel.status = ParcelStatus::Paid;
    parcel.payment_status = PaymentStatus::Paid;
    parcel.payment_intent_id = body["paymentIntentId"].as_str().map(str::to_string);
    ok(json!({ "modifiedCount": 1 }))
}

async fn assign(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let assignment: AssignedRider = match serde_json::from_value(body) {
        Ok(assignment) => assignment,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": err.to_string() })),
            )
        }
    };
    let mut parcels = db.parcels.lock().expect("parcels");
    let Some(parcel) = parcels.get_mut(&id) else {
        return not_found();
    };
    parcel.status = ParcelStatus::Assigned;
    parcel.assigned_rider = Some(assignment);
    ok(json!({ "success": true, "message": "Rider assigned" }))
}

async fn list_riders(
    State(db): State<Db>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    db.reads.fetch_add(1, Ordering::SeqCst);
    let riders: Vec<Rider> = db
        .riders
        .lock()
        .expect("riders")
        .iter()
        .filter(|rider| {
            query
                .get("status")
                .map(|status| rider.status.as_str() == status)
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    ok(json!(riders))
}

async fn create_rider(State(db): State<Db>, Json(mut rider): Json<Rider>) -> Reply {
    let id = format!("r-{}", db.riders.lock().expect("riders").len() + 1);
    rider.id = Some(id.clone());
    db.riders.lock().expect("riders").push(rider);
    ok(json!({ "acknowledged": true, "insertedId": id }))
}

async fn rider_status(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let status: RiderStatus = match serde_json::from_value(body["status"].clone()) {
        Ok(status) => status,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad status" }))),
    };
    let mut riders = db.riders.lock().expect("riders");
    match riders.iter_mut().find(|rider| rider.id.as_deref() == Some(id.as_str())) {
        Some(rider) => {
            rider.status = status;
            ok(json!({ "success": true, "modifiedCount": 1 }))
        }
        None => ok(json!({ "success": false, "message": "Rider not found" })),
    }
}

async fn delete_rider(State(db): State<Db>, Path(id): Path<String>) -> Reply {
    let mut riders = db.riders.lock().expect("riders");
    let before = riders.len();
    riders.retain(|rider| rider.id.as_deref() != Some(id.as_str()));
    ok(json!({ "deletedCount": before - riders.len() }))
}

async fn payments(Query(query): Query<HashMap<String, String>>) -> Reply {
    let record = |email: &str, amount: f64| {
        json!({
            "parcelId": "p1",
            "paymentIntentId": format!("pi_{amount}"),
            "paymentAmount": amount,
            "paymentStatus": "paid",
            "paymentDate": "2025-10-09T08:53:20Z",
            "userEmail": email,
            "parcelTitle": "Books",
            "parcelTrackingNumber": "PRO1760000000000001",
            "senderName": "Ana",
            "receiverName": "Rafi",
            "senderRegion": "Dhaka",
            "receiverRegion": "Sylhet",
        })
    };
    let all = vec![
        record(OWNER, 270.0),
        record(OWNER, 110.0),
        record("other@profast.test", 80.0),
    ];
    let filtered: Vec<Value> = match query.get("email") {
        Some(email) => all
            .into_iter()
            .filter(|row| row["userEmail"] == email.as_str())
            .collect(),
        None => all,
    };
    ok(json!(filtered))
}

async fn payment_intent(State(db): State<Db>, Json(body): Json<Value>) -> Reply {
    db.intents.fetch_add(1, Ordering::SeqCst);
    let parcel = body["parcelId"].as_str().unwrap_or_default();
    ok(json!({ "clientSecret": format!("secret_for_{parcel}") }))
}

async fn backend() -> (Db, String) {
    let db = Db::default();
    let app = Router::new()
        .route("/users", post(save_user))
        .route("/users/role/:email", get(role))
        .route("/users/:id/role", patch(change_role))
        .route("/parcels", get(list_parcels).post(create_parcel))
        .route("/parcels/track/:code", get(track))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/parcels/:id/payment", patch(mark_paid))
        .route("/parcels/:id/assign-rider", patch(assign))
        .route("/riders", get(list_riders).post(create_rider))
        .route("/riders/:id", axum::routing::delete(delete_rider))
        .route("/riders/:id/status", patch(rider_status))
        .route("/payments", get(payments))
        .route("/create-payment-intent", post(payment_intent))
        .with_state(db.clone());
    let base = serve(app).await;
    (db, base)
}

// ---- fake identity provider and payment processor ---------------------------

#[derive(Default)]
struct FakeIdentity {
    profile_down: bool,
    signed_out: AtomicBool,
}

#[async_trait]
impl TokenSource for FakeIdentity {
    async fn id_token(&self) -> Result<Option<String>, IdentityError> {
        if self.signed_out.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some("id-token".into()))
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, IdentityError> {
        if password == PASSWORD {
            Ok(auth_user(email))
        } else {
            Err(IdentityError::from_code(
                "auth/invalid-credential",
                "Firebase: Error (auth/invalid-credential).",
            ))
        }
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> Result<AuthUser, IdentityError> {
        match provider {
            OAuthProvider::Google => Ok(AuthUser {
                provider: provider.into(),
                ..auth_user(ADMIN)
            }),
            OAuthProvider::Github => Err(IdentityError::from_code(
                "auth/popup-closed-by-user",
                "closed",
            )),
        }
    }

    async fn create_user(&self, email: &str, _password: &str) -> Result<AuthUser, IdentityError> {
        if email == "taken@profast.test" {
            return Err(IdentityError::from_code("auth/email-already-in-use", "taken"));
        }
        Ok(AuthUser {
            display_name: None,
            ..auth_user(email)
        })
    }

    async fn update_profile(
        &self,
        _display_name: &str,
        _photo_url: Option<&str>,
    ) -> Result<(), IdentityError> {
        if self.profile_down {
            Err(IdentityError::Other("profile service unavailable".into()))
        } else {
            Ok(())
        }
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.signed_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeProcessor {
    result: Result<PaymentIntent, PaymentFailure>,
    secrets: Mutex<Vec<(String, BillingDetails)>>,
}

impl FakeProcessor {
    fn succeeding(intent: &str) -> Self {
        Self::answering(Ok(PaymentIntent {
            id: intent.to_string(),
            status: IntentStatus::Succeeded,
        }))
    }

    fn answering(result: Result<PaymentIntent, PaymentFailure>) -> Self {
        Self {
            result,
            secrets: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        billing: &BillingDetails,
    ) -> Result<PaymentIntent, PaymentFailure> {
        self.secrets
            .lock()
            .expect("secrets")
            .push((client_secret.to_string(), billing.clone()));
        self.result.clone()
    }
}

fn api_for(base: &str, identity: Arc<FakeIdentity>) -> ApiClient {
    let tokens: Arc<dyn TokenSource> = identity;
    common::client(base, tokens)
}

fn draft() -> ParcelDraft {
    ParcelDraft {
        parcel_type: ParcelType::NonDocument,
        title: " Books ".into(),
        weight: Some(4.5),
        sender_name: "Ana".into(),
        sender_contact: "01700000000".into(),
        sender_region: "Dhaka".into(),
        sender_service_center: "Gulshan".into(),
        sender_address: "Road 1".into(),
        pickup_instruction: Some("  ".into()),
        receiver_name: "Rafi".into(),
        receiver_contact: "01800000000".into(),
        receiver_region: "Sylhet".into(),
        receiver_service_center: "Zindabazar".into(),
        receiver_address: "Lane 2".into(),
        delivery_instruction: Some("Call first".into()),
    }
}

fn registration(email: &str) -> Registration {
    Registration {
        name: "Ana Rahman".into(),
        email: email.into(),
        photo_url: Some("https://img.example.com/ana.png".into()),
        password: PASSWORD.into(),
        terms_accepted: true,
    }
}

// ---- authentication ----------------------------------------------------------

#[tokio::test]
async fn registration_keeps_the_account_when_the_profile_update_fails() {
    let (db, base) = backend().await;
    let identity = Arc::new(FakeIdentity {
        profile_down: true,
        ..FakeIdentity::default()
    });
    let api = api_for(&base, identity.clone());

    let outcome = app::register_account(identity.as_ref(), &api, registration(OWNER))
        .await
        .expect("registered");
    assert_eq!(
        outcome.profile_warning.as_deref(),
        Some("profile service unavailable")
    );
    assert!(outcome.record_warning.is_none());
    assert!(outcome.session.is_signed_in());
    assert_eq!(outcome.session.role(), RoleResolution::Resolved(Role::User));
    assert_eq!(outcome.session.user().and_then(|u| u.display_name.clone()), None);

    let users = db.users.lock().expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], OWNER);
    assert_eq!(users[0]["role"], "user");
}

#[tokio::test]
async fn registration_validates_before_calling_the_identity_provider() {
    let (db, base) = backend().await;
    let identity = Arc::new(FakeIdentity::default());
    let api = api_for(&base, identity.clone());

    let mut weak = registration(OWNER);
    weak.password = "secret".into();
    let err = app::register_account(identity.as_ref(), &api, weak)
        .await
        .expect_err("weak password");
    assert!(matches!(err, AppError::Validation(_)));

    let err = app::register_account(identity.as_ref(), &api, registration("taken@profast.test"))
        .await
        .expect_err("taken");
    assert!(matches!(err, AppError::Auth(IdentityError::EmailInUse)));
    assert!(db.users.lock().expect("users").is_empty());
}

#[tokio::test]
async fn sign_in_resolves_the_role_and_sign_out_ends_the_session() {
    let (_, base) = backend().await;
    let identity = Arc::new(FakeIdentity::default());
    let api = api_for(&base, identity.clone());

    let err = app::sign_in_with_password(identity.as_ref(), &api, OWNER, "wrong")
        .await
        .expect_err("bad password");
    assert!(matches!(err, AppError::Auth(IdentityError::InvalidCredential)));

    let mut session = app::sign_in_with_oauth(identity.as_ref(), &api, OAuthProvider::Google)
        .await
        .expect("google");
    assert_eq!(session.role(), RoleResolution::Resolved(Role::Admin));

    let err = app::sign_in_with_oauth(identity.as_ref(), &api, OAuthProvider::Github)
        .await
        .expect_err("popup closed");
    assert!(matches!(err, AppError::Auth(IdentityError::PopupClosed)));

    app::sign_out(identity.as_ref(), &api, &mut session)
        .await
        .expect("signed out");
    assert!(!session.is_signed_in());
    assert_eq!(session.role(), RoleResolution::Failed);
}

// ---- parcels -------------------------------------------------------------------

#[tokio::test]
async fn booking_prices_and_stores_a_pending_parcel() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    let mut session = session_as(OWNER, Role::User);

    let parcel = app::book_parcel(&api, &mut session, draft())
        .await
        .expect("booked");
    let id = parcel.id.clone().expect("id assigned");
    assert_eq!(parcel.cost, 270);
    assert_eq!(parcel.title, "Books");
    assert_eq!(parcel.status, ParcelStatus::Pending);
    assert_eq!(parcel.payment_status, PaymentStatus::Unpaid);
    assert!(parcel.pickup_instruction.is_none());
    assert!(TrackingCode::parse(&parcel.tracking_number).is_some());

    let stored = db.parcel(&id).expect("stored");
    assert_eq!(stored.user_email, OWNER);
    assert_eq!(stored.tracking_number, parcel.tracking_number);

    let tracked = app::track_parcel(&api, &parcel.tracking_number)
        .await
        .expect("tracked");
    assert_eq!(tracked.step, Some(0));
}

#[tokio::test]
async fn booking_rejects_bad_drafts_and_anonymous_callers() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));

    let mut session = session_as(OWNER, Role::User);
    let mut blank = draft();
    blank.title = "   ".into();
    assert!(matches!(
        app::book_parcel(&api, &mut session, blank).await,
        Err(AppError::Validation(_))
    ));

    let mut wrong_center = draft();
    wrong_center.receiver_service_center = "Gulshan".into();
    assert!(matches!(
        app::book_parcel(&api, &mut session, wrong_center).await,
        Err(AppError::Validation(_))
    ));

    let mut anonymous = profast::domain::Session::anonymous();
    let err = app::book_parcel(&api, &mut anonymous, draft())
        .await
        .expect_err("anonymous");
    assert!(matches!(err, AppError::SignInRequired));
    assert_eq!(err.redirect(), Some(Redirect::Login));

    assert!(db.parcels.lock().expect("parcels").is_empty());
}

#[tokio::test]
async fn owners_delete_their_unassigned_parcels() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(pending_parcel("p1"));

    let mut stranger = session_as("eve@profast.test", Role::User);
    assert!(matches!(
        app::delete_parcel(&api, &mut stranger, "p1").await,
        Err(AppError::Transition(TransitionError::NotPermitted { .. }))
    ));

    let mut owner = session_as(OWNER, Role::User);
    app::delete_parcel(&api, &mut owner, "p1")
        .await
        .expect("deleted");
    assert!(db.parcel("p1").is_none());
}

#[tokio::test]
async fn expired_tokens_end_the_session_mid_flow() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(paid_parcel("p1"));
    db.expire_sessions.store(true, Ordering::SeqCst);

    let mut session = session_as(ADMIN, Role::Admin);
    let err = app::set_rider_status(
        &api,
        &mut session,
        &rider("r1", RiderStatus::Pending),
        RiderAction::Approve,
    )
    .await
    .expect_err("expired");
    assert!(matches!(err, AppError::Api(ApiError::Unauthorized)));
    assert_eq!(err.redirect(), Some(Redirect::Login));
    assert!(!session.is_signed_in());
}

// ---- payments ------------------------------------------------------------------

#[tokio::test]
async fn paying_marks_the_parcel_paid() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(pending_parcel("p1"));
    let processor = FakeProcessor::succeeding("pi_777");
    let mut session = session_as(OWNER, Role::User);

    let outcome = app::pay_for_parcel(&api, &processor, &mut session, "p1")
        .await
        .expect("paid");
    let PaymentOutcome::Paid { parcel, .. } = &outcome else {
        panic!("expected a completed payment, got {outcome:?}");
    };
    assert_eq!(outcome.payment_intent_id(), "pi_777");
    assert_eq!(parcel.status, ParcelStatus::Paid);

    let stored = db.parcel("p1").expect("stored");
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_777"));

    let update = db.payment_updates.lock().expect("payment updates")[0].clone();
    assert_eq!(update["paymentAmount"], 270.0);
    assert_eq!(update["userEmail"], OWNER);

    let seen = processor.secrets.lock().expect("secrets");
    assert_eq!(seen[0].0, "secret_for_p1");
    assert_eq!(seen[0].1.email.as_deref(), Some(OWNER));

    drop(seen);
    let err = app::pay_for_parcel(&api, &processor, &mut session, "p1")
        .await
        .expect_err("already paid");
    assert!(matches!(
        err,
        AppError::Transition(TransitionError::AlreadyPaid)
    ));
}

#[tokio::test]
async fn parcels_that_are_not_pending_are_never_charged() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(parcel("p9", ParcelStatus::Cancelled, PaymentStatus::Unpaid));
    db.seed(parcel("p8", ParcelStatus::InTransit, PaymentStatus::Unpaid));
    let processor = FakeProcessor::succeeding("pi_999");
    let mut session = session_as(OWNER, Role::User);

    let err = app::pay_for_parcel(&api, &processor, &mut session, "p9")
        .await
        .expect_err("cancelled");
    assert!(matches!(
        err,
        AppError::Transition(TransitionError::NotPending(ParcelStatus::Cancelled))
    ));
    let err = app::pay_for_parcel(&api, &processor, &mut session, "p8")
        .await
        .expect_err("in transit");
    assert!(matches!(
        err,
        AppError::Transition(TransitionError::NotPending(ParcelStatus::InTransit))
    ));

    assert_eq!(db.intents.load(Ordering::SeqCst), 0);
    assert!(processor.secrets.lock().expect("secrets").is_empty());
    assert_eq!(
        db.parcel("p9").expect("stored").payment_status,
        PaymentStatus::Unpaid
    );
}

#[tokio::test]
async fn only_the_owner_can_pay() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(pending_parcel("p1"));
    let processor = FakeProcessor::succeeding("pi_999");
    let mut session = session_as("someone@profast.test", Role::User);

    let err = app::pay_for_parcel(&api, &processor, &mut session, "p1")
        .await
        .expect_err("not the owner");
    assert!(matches!(
        err,
        AppError::Transition(TransitionError::NotPermitted { .. })
    ));
    assert_eq!(db.intents.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_failed_status_update_after_charging_is_a_soft_warning() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(pending_parcel("p1"));
    db.fail_payment_update.store(true, Ordering::SeqCst);
    let processor = FakeProcessor::succeeding("pi_888");
    let mut session = session_as(OWNER, Role::User);

    let outcome = app::pay_for_parcel(&api, &processor, &mut session, "p1")
        .await
        .expect("charged");
    match outcome {
        PaymentOutcome::PaidStatusPending {
            parcel,
            payment_intent_id,
            warning,
        } => {
            assert_eq!(payment_intent_id, "pi_888");
            assert_eq!(parcel.status, ParcelStatus::Pending);
            assert_eq!(warning, "Failed to update parcel status");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(session.is_signed_in());
}

#[tokio::test]
async fn processor_failures_are_classified() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(pending_parcel("p1"));
    let mut session = session_as(OWNER, Role::User);

    let blocked = FakeProcessor::answering(Err(PaymentFailure::classify("Failed to fetch")));
    let err = app::pay_for_parcel(&api, &blocked, &mut session, "p1")
        .await
        .expect_err("blocked");
    assert!(matches!(
        err,
        AppError::Payment(PaymentFailure::AdBlockerSuspected(_))
    ));

    let stuck = FakeProcessor::answering(Ok(PaymentIntent {
        id: "pi_1".into(),
        status: IntentStatus::RequiresAction,
    }));
    let err = app::pay_for_parcel(&api, &stuck, &mut session, "p1")
        .await
        .expect_err("incomplete");
    assert!(matches!(
        err,
        AppError::PaymentIncomplete(IntentStatus::RequiresAction)
    ));
    assert_eq!(
        db.parcel("p1").expect("stored").status,
        ParcelStatus::Pending
    );
}

#[tokio::test]
async fn customers_see_their_payments_and_admins_see_all() {
    let (_, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));

    let mut customer = session_as(OWNER, Role::User);
    let mine = app::payment_history(&api, &mut customer)
        .await
        .expect("history");
    assert_eq!(mine.records.len(), 2);
    assert_eq!(mine.summary.count, 2);
    assert_eq!(mine.summary.total, 380.0);
    assert_eq!(mine.summary.average, 190.0);

    let mut admin = session_as(ADMIN, Role::Admin);
    let all = app::payment_history(&api, &mut admin)
        .await
        .expect("history");
    assert_eq!(all.records.len(), 3);
}

// ---- admin -----------------------------------------------------------------------

#[tokio::test]
async fn admin_flows_are_gated_before_any_request() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(paid_parcel("p1"));

    let mut customer = session_as(OWNER, Role::User);
    let err = app::assign_rider(&api, &mut customer, "p1", "r1")
        .await
        .expect_err("customer");
    assert!(matches!(err, AppError::Role(RoleError::AdminRequired)));
    assert_eq!(err.redirect(), Some(Redirect::Forbidden));

    let mut resolving = profast::domain::Session::start(common::auth_user(ADMIN));
    assert!(matches!(
        app::assign_rider(&api, &mut resolving, "p1", "r1").await,
        Err(AppError::Role(RoleError::Unresolved))
    ));
    assert!(matches!(
        app::change_user_role(&api, &mut customer, "u2", Role::Admin).await,
        Err(AppError::Role(RoleError::AdminRequired))
    ));

    assert_eq!(db.reads.load(Ordering::SeqCst), 0);
    assert!(db.role_changes.lock().expect("roles").is_empty());
}

#[tokio::test]
async fn admin_assigns_an_active_rider() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    db.seed(paid_parcel("p1"));
    db.seed(pending_parcel("p2"));
    db.riders.lock().expect("riders").extend([
        rider("r1", RiderStatus::Active),
        rider("r2", RiderStatus::Pending),
    ]);
    let mut admin = session_as(ADMIN, Role::Admin);

    assert!(matches!(
        app::assign_rider(&api, &mut admin, "p2", "r1").await,
        Err(AppError::Transition(TransitionError::NotPaid(ParcelStatus::Pending)))
    ));
    assert!(matches!(
        app::assign_rider(&api, &mut admin, "p1", "r2").await,
        Err(AppError::Transition(TransitionError::RiderNotActive))
    ));

    let parcel = app::assign_rider(&api, &mut admin, "p1", "r1")
        .await
        .expect("assigned");
    assert_eq!(parcel.status, ParcelStatus::Assigned);

    let stored = db.parcel("p1").expect("stored");
    assert_eq!(stored.status, ParcelStatus::Assigned);
    assert_eq!(
        stored.assigned_rider.map(|rider| rider.rider_id),
        Some("r1".to_string())
    );

    assert!(matches!(
        app::assign_rider(&api, &mut admin, "p1", "r1").await,
        Err(AppError::Transition(TransitionError::NotPaid(ParcelStatus::Assigned)))
    ));
}

#[tokio::test]
async fn revoking_a_busy_rider_reports_stranded_parcels() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    let busy = rider("r1", RiderStatus::Active);
    let mut carried = paid_parcel("p1");
    carried.status = ParcelStatus::Assigned;
    carried.assigned_rider = Some(AssignedRider::from_rider("r1".into(), &busy, at()));
    db.seed(carried.clone());
    db.riders.lock().expect("riders").push(busy.clone());
    let mut admin = session_as(ADMIN, Role::Admin);

    let update = app::set_rider_status(&api, &mut admin, &busy, RiderAction::Revoke)
        .await
        .expect("revoked");
    assert_eq!(update.outcome, RiderOutcome::Status(RiderStatus::Pending));
    assert_eq!(update.stranded_parcels, vec![carried.tracking_number.clone()]);
    assert!(db.parcel("p1").expect("stored").has_rider());

    let revoked = rider("r1", RiderStatus::Pending);
    let update = app::reject_rider(&api, &mut admin, &revoked)
        .await
        .expect("rejected");
    assert_eq!(update.outcome, RiderOutcome::Deleted);
    assert!(api
        .list_riders(Some(RiderStatus::Active))
        .await
        .expect("riders")
        .is_empty());
    assert!(db.riders.lock().expect("riders").is_empty());
}

#[tokio::test]
async fn admins_change_roles() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    let mut admin = session_as(ADMIN, Role::Admin);

    let role = app::change_user_role(&api, &mut admin, "u2", Role::Admin)
        .await
        .expect("promoted");
    assert_eq!(role, Role::Admin);
    let changes = db.role_changes.lock().expect("roles");
    assert_eq!(changes[0].0, "u2");
    assert_eq!(changes[0].1, json!({ "role": "admin" }));
}

#[tokio::test]
async fn rider_applications_start_pending() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    let mut session = session_as(OWNER, Role::User);

    let application = RiderApplication {
        name: " Sakib Hasan ".into(),
        email: "sakib@riders.test".into(),
        phone: "01911111111".into(),
        date_of_birth: "1996-02-14".into(),
        address: "Uttara".into(),
        vehicle_type: VehicleType::Bicycle,
        vehicle_model: "Duranta".into(),
        license_plate: "N/A".into(),
        experience: Some(String::new()),
        preferred_areas: Some("Uttara, Banani".into()),
        terms_accepted: true,
    };

    let mut unaccepted = application.clone();
    unaccepted.terms_accepted = false;
    assert!(matches!(
        app::apply_as_rider(&api, &mut session, unaccepted).await,
        Err(AppError::Validation(_))
    ));

    let rider = app::apply_as_rider(&api, &mut session, application)
        .await
        .expect("applied");
    assert_eq!(rider.id.as_deref(), Some("r-1"));
    assert_eq!(rider.name, "Sakib Hasan");
    assert_eq!(rider.status, RiderStatus::Pending);
    assert!(rider.experience.is_none());

    let stored = db.riders.lock().expect("riders");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, RiderStatus::Pending);
}

#[tokio::test]
async fn customers_list_only_their_own_parcels() {
    let (db, base) = backend().await;
    let api = api_for(&base, Arc::new(FakeIdentity::default()));
    let mut older = pending_parcel("p1");
    older.creation_date = at() - time::Duration::days(2);
    db.seed(older);
    db.seed(paid_parcel("p2"));
    let mut foreign = pending_parcel("p3");
    foreign.user_email = "eve@profast.test".into();
    db.seed(foreign);

    let mut session = session_as(OWNER, Role::User);
    let mine = app::my_parcels(&api, &mut session).await.expect("parcels");
    let ids: Vec<_> = mine.iter().filter_map(|parcel| parcel.id.as_deref()).collect();
    assert_eq!(ids, ["p2", "p1"]);
}

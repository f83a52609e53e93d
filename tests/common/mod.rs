#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use time::OffsetDateTime;

use profast::domain::{
    AuthProvider, AuthUser, Parcel, ParcelStatus, ParcelType, PaymentStatus, Rider, RiderStatus,
    Role, RoleResolution, Session, VehicleType,
};
use profast::infra::{api::ApiClient, identity::TokenSource};
use profast::util::persistence::Config;

pub const OWNER: &str = "ana@profast.test";
pub const ADMIN: &str = "boss@profast.test";

pub fn at() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_760_000_000).expect("timestamp")
}

pub fn parcel(id: &str, status: ParcelStatus, payment_status: PaymentStatus) -> Parcel {
    Parcel {
        id: Some(id.to_string()),
        tracking_number: format!("PRO1760000000000{}", &id[id.len().saturating_sub(3)..]),
        parcel_type: ParcelType::NonDocument,
        title: "Books".into(),
        weight: Some(4.5),
        sender_name: "Ana".into(),
        sender_contact: "01700000000".into(),
        sender_region: "Dhaka".into(),
        sender_service_center: "Gulshan".into(),
        sender_address: "Road 1".into(),
        pickup_instruction: None,
        receiver_name: "Rafi".into(),
        receiver_contact: "01800000000".into(),
        receiver_region: "Sylhet".into(),
        receiver_service_center: "Zindabazar".into(),
        receiver_address: "Lane 2".into(),
        delivery_instruction: None,
        cost: 270,
        status,
        payment_status,
        payment_intent_id: None,
        payment_date: None,
        assigned_rider: None,
        user_email: OWNER.into(),
        user_id: Some("uid-ana".into()),
        user_display_name: Some("Ana".into()),
        user_photo_url: None,
        creation_date: at(),
        booking_timestamp: 1_760_000_000_000,
    }
}

pub fn pending_parcel(id: &str) -> Parcel {
    parcel(id, ParcelStatus::Pending, PaymentStatus::Unpaid)
}

pub fn paid_parcel(id: &str) -> Parcel {
    let mut parcel = parcel(id, ParcelStatus::Paid, PaymentStatus::Paid);
    parcel.payment_intent_id = Some("pi_existing".into());
    parcel.payment_date = Some(at());
    parcel
}

pub fn rider(id: &str, status: RiderStatus) -> Rider {
    Rider {
        id: Some(id.to_string()),
        name: format!("Rider {id}"),
        email: format!("{id}@riders.test"),
        phone: "01900000000".into(),
        date_of_birth: "1995-04-01".into(),
        address: "Mirpur".into(),
        vehicle_type: VehicleType::Motorcycle,
        vehicle_model: "Honda CB".into(),
        license_plate: "DHA-1234".into(),
        experience: None,
        preferred_areas: None,
        status,
    }
}

pub fn auth_user(email: &str) -> AuthUser {
    AuthUser {
        uid: format!("uid-{email}"),
        email: email.to_string(),
        display_name: Some("Ana".into()),
        photo_url: None,
        provider: AuthProvider::Email,
    }
}

pub fn session_as(email: &str, role: Role) -> Session {
    let mut session = Session::start(auth_user(email));
    session.set_role(RoleResolution::Resolved(role));
    session
}

/// Run `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    format!("http://{addr}/")
}

pub fn client(base_url: &str, tokens: Arc<dyn TokenSource>) -> ApiClient {
    let config = Config {
        api_base_url: base_url.to_string(),
        request_timeout_secs: 5,
        ..Config::default()
    };
    ApiClient::from_config(&config, tokens).expect("api client")
}

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::roles::Role;

/// Backend document identifier (`_id`).
pub type RecordId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParcelType {
    Document,
    NonDocument,
}

impl ParcelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelType::Document => "document",
            ParcelType::NonDocument => "non-document",
        }
    }
}

impl fmt::Display for ParcelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParcelType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(ParcelType::Document),
            "non-document" | "non_document" | "nondocument" => Ok(ParcelType::NonDocument),
            other => Err(format!("unknown parcel type `{other}`")),
        }
    }
}

/// Where a parcel is in its lifecycle. Exactly one status at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParcelStatus {
    #[default]
    Pending,
    Paid,
    Assigned,
    Processing,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Pending => "pending",
            ParcelStatus::Paid => "paid",
            ParcelStatus::Assigned => "assigned",
            ParcelStatus::Processing => "processing",
            ParcelStatus::Shipped => "shipped",
            ParcelStatus::InTransit => "in-transit",
            ParcelStatus::OutForDelivery => "out-for-delivery",
            ParcelStatus::Delivered => "delivered",
            ParcelStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ParcelStatus::Delivered | ParcelStatus::Cancelled)
    }

    /// Next status in the delivery progression, if any.
    pub fn next_delivery_step(&self) -> Option<ParcelStatus> {
        match self {
            ParcelStatus::Assigned => Some(ParcelStatus::Processing),
            ParcelStatus::Processing => Some(ParcelStatus::Shipped),
            ParcelStatus::Shipped => Some(ParcelStatus::InTransit),
            ParcelStatus::InTransit => Some(ParcelStatus::OutForDelivery),
            ParcelStatus::OutForDelivery => Some(ParcelStatus::Delivered),
            ParcelStatus::Pending
            | ParcelStatus::Paid
            | ParcelStatus::Delivered
            | ParcelStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

/// Snapshot of the rider attached to a parcel at assignment time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedRider {
    pub rider_id: RecordId,
    pub rider_name: String,
    pub rider_email: String,
    pub rider_phone: String,
    pub vehicle_type: VehicleType,
    #[serde(with = "time::serde::rfc3339")]
    pub assigned_at: OffsetDateTime,
}

impl AssignedRider {
    pub fn from_rider(rider_id: RecordId, rider: &Rider, assigned_at: OffsetDateTime) -> Self {
        Self {
            rider_id,
            rider_name: rider.display_name().to_string(),
            rider_email: rider.email.clone(),
            rider_phone: rider.phone.clone(),
            vehicle_type: rider.vehicle_type,
            assigned_at,
        }
    }
}

/// A shipment booking as stored by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub tracking_number: String,
    #[serde(rename = "type")]
    pub parcel_type: ParcelType,
    pub title: String,
    /// Only meaningful for non-document parcels.
    #[serde(default, deserialize_with = "lenient_weight")]
    pub weight: Option<f64>,

    pub sender_name: String,
    pub sender_contact: String,
    pub sender_region: String,
    pub sender_service_center: String,
    pub sender_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_instruction: Option<String>,

    pub receiver_name: String,
    pub receiver_contact: String,
    pub receiver_region: String,
    pub receiver_service_center: String,
    pub receiver_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_instruction: Option<String>,

    /// Fixed at creation; the backend copy is authoritative.
    pub cost: u32,
    #[serde(default)]
    pub status: ParcelStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_date: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_rider: Option<AssignedRider>,

    /// Owner of the booking; never changes after creation.
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_display_name: Option<String>,
    #[serde(
        rename = "userPhotoURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_photo_url: Option<String>,
    #[serde(
        rename = "creation_date",
        alias = "creationDate",
        with = "time::serde::rfc3339"
    )]
    pub creation_date: OffsetDateTime,
    #[serde(default)]
    pub booking_timestamp: i64,
}

impl Parcel {
    pub fn is_owned_by(&self, email: &str) -> bool {
        self.user_email.eq_ignore_ascii_case(email)
    }

    pub fn is_same_region(&self) -> bool {
        self.sender_region == self.receiver_region
    }

    pub fn has_rider(&self) -> bool {
        self.assigned_rider.is_some()
    }

    /// Paid parcels with no rider are the ones offered on the assignment board.
    pub fn awaiting_assignment(&self) -> bool {
        self.status == ParcelStatus::Paid
            && self.payment_status == PaymentStatus::Paid
            && self.assigned_rider.is_none()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    #[default]
    Motorcycle,
    Bicycle,
    Car,
    Truck,
}

impl VehicleType {
    pub fn description(&self) -> &'static str {
        match self {
            VehicleType::Motorcycle => "Fast delivery for small packages",
            VehicleType::Bicycle => "Eco-friendly option for nearby deliveries",
            VehicleType::Car => "Medium packages and longer distances",
            VehicleType::Truck => "Large packages and bulk deliveries",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiderStatus {
    #[default]
    Pending,
    Active,
}

impl RiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderStatus::Pending => "pending",
            RiderStatus::Active => "active",
        }
    }
}

impl fmt::Display for RiderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery worker record, independent of the user account model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rider {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(alias = "fullName")]
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub vehicle_model: String,
    #[serde(default)]
    pub license_plate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_areas: Option<String>,
    #[serde(default)]
    pub status: RiderStatus,
}

impl Rider {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Unknown Name"
        } else {
            &self.name
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RiderStatus::Active
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Email,
    Google,
    Github,
}

/// Account record keyed by email.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub provider: AuthProvider,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub role: Role,
}

/// Body of `GET /users/role/{email}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleInfo {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
}

impl RoleInfo {
    /// Synthesized when the backend has no record yet for the email.
    pub fn unprovisioned(email: &str) -> Self {
        Self {
            success: true,
            email: email.to_string(),
            role: Role::User,
            name: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Immutable record written once per successful parcel payment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub parcel_id: RecordId,
    pub payment_intent_id: String,
    #[serde(rename = "paymentAmount", alias = "amount")]
    pub amount: f64,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(rename = "paymentDate", alias = "date", with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(default)]
    pub user_email: Option<String>,
    pub parcel_title: String,
    pub parcel_tracking_number: String,
    pub sender_name: String,
    pub receiver_name: String,
    pub sender_region: String,
    pub receiver_region: String,
}

/// Totals shown above the payment history table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaymentSummary {
    pub count: usize,
    pub total: f64,
    pub average: f64,
}

impl PaymentSummary {
    pub fn from_records(records: &[PaymentRecord]) -> Self {
        let amounts: Vec<f64> = records
            .iter()
            .map(|record| record.amount)
            .filter(|amount| amount.is_finite())
            .collect();
        let total: f64 = amounts.iter().sum();
        // Unreadable amounts still count as rows but stay out of the average.
        let count = records.len();
        let average = if amounts.is_empty() {
            0.0
        } else {
            total / amounts.len() as f64
        };
        Self {
            count,
            total,
            average,
        }
    }
}

pub struct TrackingStep {
    pub status: ParcelStatus,
    pub label: &'static str,
    pub description: &'static str,
}

pub const TRACKING_STEPS: [TrackingStep; 7] = [
    TrackingStep {
        status: ParcelStatus::Pending,
        label: "Order Placed",
        description: "Your parcel booking has been received",
    },
    TrackingStep {
        status: ParcelStatus::Paid,
        label: "Payment Confirmed",
        description: "Payment has been processed successfully",
    },
    TrackingStep {
        status: ParcelStatus::Processing,
        label: "Processing",
        description: "Your parcel is being prepared for shipment",
    },
    TrackingStep {
        status: ParcelStatus::Shipped,
        label: "Shipped",
        description: "Your parcel has been picked up and is in our facility",
    },
    TrackingStep {
        status: ParcelStatus::InTransit,
        label: "In Transit",
        description: "Your parcel is on its way to destination",
    },
    TrackingStep {
        status: ParcelStatus::OutForDelivery,
        label: "Out for Delivery",
        description: "Your parcel is out for final delivery",
    },
    TrackingStep {
        status: ParcelStatus::Delivered,
        label: "Delivered",
        description: "Your parcel has been successfully delivered",
    },
];

/// Index into [`TRACKING_STEPS`]. Assigned parcels still show as paid;
/// cancelled parcels are off the track entirely.
pub fn tracking_step_index(status: ParcelStatus) -> Option<usize> {
    let shown = match status {
        ParcelStatus::Assigned => ParcelStatus::Paid,
        ParcelStatus::Cancelled => return None,
        other => other,
    };
    TRACKING_STEPS.iter().position(|step| step.status == shown)
}

/// Weight arrives as a number, a numeric string, an empty string or null.
fn lenient_weight<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct WeightVisitor;

    impl<'de> serde::de::Visitor<'de> for WeightVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, a numeric string or null")
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| E::custom(format!("invalid weight `{value}`")))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(WeightVisitor)
}

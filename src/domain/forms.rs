//! Input validation for the booking, rider application and sign-up forms.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::{Validate, ValidationError};

use super::entities::{Parcel, ParcelStatus, ParcelType, PaymentStatus, Rider, RiderStatus, VehicleType};
use super::pricing::compute_cost;
use super::regions;
use super::session::AuthUser;
use crate::util::TrackingCode;

fn failure(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(failure("required", "This field is required"));
    }
    Ok(())
}

/// Same looseness as the form rule `^\S+@\S+$`.
fn loose_email(value: &str) -> Result<(), ValidationError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(failure("email", "Invalid email address"))
    }
}

fn known_region(value: &str) -> Result<(), ValidationError> {
    if regions::is_known_region(value) {
        Ok(())
    } else {
        Err(failure("region", "Unknown region"))
    }
}

fn must_accept(value: &bool) -> Result<(), ValidationError> {
    if *value {
        Ok(())
    } else {
        Err(failure("terms", "You must agree to the terms"))
    }
}

fn password_strength(value: &str) -> Result<(), ValidationError> {
    let lower = value.chars().any(|c| c.is_ascii_lowercase());
    let upper = value.chars().any(|c| c.is_ascii_uppercase());
    let digit = value.chars().any(|c| c.is_ascii_digit());
    if lower && upper && digit {
        Ok(())
    } else {
        Err(failure(
            "password_strength",
            "Password must contain at least one uppercase, one lowercase, and one number",
        ))
    }
}

fn parcel_rules(draft: &ParcelDraft) -> Result<(), ValidationError> {
    if draft.parcel_type == ParcelType::NonDocument && draft.weight.is_none() {
        return Err(failure(
            "weight_required",
            "Weight is required for non-document parcels",
        ));
    }
    if !regions::is_service_center(&draft.sender_region, &draft.sender_service_center) {
        return Err(failure(
            "sender_service_center",
            "Sender service center is not in the sender region",
        ));
    }
    if !regions::is_service_center(&draft.receiver_region, &draft.receiver_service_center) {
        return Err(failure(
            "receiver_service_center",
            "Receiver service center is not in the receiver region",
        ));
    }
    Ok(())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// What the customer fills in on the booking form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "parcel_rules", skip_on_field_errors = false))]
pub struct ParcelDraft {
    #[serde(rename = "type")]
    pub parcel_type: ParcelType,
    #[validate(custom = "non_blank")]
    pub title: String,
    #[validate(range(min = 0.1, message = "Weight must be at least 0.1 kg"))]
    pub weight: Option<f64>,

    #[validate(custom = "non_blank")]
    pub sender_name: String,
    #[validate(custom = "non_blank")]
    pub sender_contact: String,
    #[validate(custom = "known_region")]
    pub sender_region: String,
    pub sender_service_center: String,
    #[validate(custom = "non_blank")]
    pub sender_address: String,
    #[serde(default)]
    pub pickup_instruction: Option<String>,

    #[validate(custom = "non_blank")]
    pub receiver_name: String,
    #[validate(custom = "non_blank")]
    pub receiver_contact: String,
    #[validate(custom = "known_region")]
    pub receiver_region: String,
    pub receiver_service_center: String,
    #[validate(custom = "non_blank")]
    pub receiver_address: String,
    #[serde(default)]
    pub delivery_instruction: Option<String>,
}

impl ParcelDraft {
    pub fn cost(&self) -> u32 {
        compute_cost(
            self.parcel_type,
            self.weight,
            &self.sender_region,
            &self.receiver_region,
        )
    }

    /// Turn a validated draft into a new pending booking owned by `owner`.
    pub fn into_parcel(self, owner: &AuthUser, tracking: TrackingCode, now: OffsetDateTime) -> Parcel {
        let cost = self.cost();
        let weight = match self.parcel_type {
            ParcelType::Document => None,
            ParcelType::NonDocument => self.weight,
        };
        Parcel {
            id: None,
            tracking_number: tracking.into_string(),
            parcel_type: self.parcel_type,
            title: self.title.trim().to_string(),
            weight,
            sender_name: self.sender_name,
            sender_contact: self.sender_contact,
            sender_region: self.sender_region,
            sender_service_center: self.sender_service_center,
            sender_address: self.sender_address,
            pickup_instruction: optional_text(self.pickup_instruction),
            receiver_name: self.receiver_name,
            receiver_contact: self.receiver_contact,
            receiver_region: self.receiver_region,
            receiver_service_center: self.receiver_service_center,
            receiver_address: self.receiver_address,
            delivery_instruction: optional_text(self.delivery_instruction),
            cost,
            status: ParcelStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_intent_id: None,
            payment_date: None,
            assigned_rider: None,
            user_email: owner.email.clone(),
            user_id: Some(owner.uid.clone()),
            user_display_name: owner.display_name.clone(),
            user_photo_url: owner.photo_url.clone(),
            creation_date: now,
            booking_timestamp: (now.unix_timestamp_nanos() / 1_000_000) as i64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RiderApplication {
    #[validate(custom = "non_blank")]
    pub name: String,
    #[validate(custom = "loose_email")]
    pub email: String,
    #[validate(custom = "non_blank")]
    pub phone: String,
    #[validate(custom = "non_blank")]
    pub date_of_birth: String,
    #[validate(custom = "non_blank")]
    pub address: String,
    pub vehicle_type: VehicleType,
    #[validate(custom = "non_blank")]
    pub vehicle_model: String,
    #[validate(custom = "non_blank")]
    pub license_plate: String,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub preferred_areas: Option<String>,
    #[validate(custom = "must_accept")]
    pub terms_accepted: bool,
}

impl RiderApplication {
    /// Every application starts out pending review.
    pub fn into_rider(self) -> Rider {
        Rider {
            id: None,
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone,
            date_of_birth: self.date_of_birth,
            address: self.address,
            vehicle_type: self.vehicle_type,
            vehicle_model: self.vehicle_model,
            license_plate: self.license_plate,
            experience: optional_text(self.experience),
            preferred_areas: optional_text(self.preferred_areas),
            status: RiderStatus::Pending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(custom = "loose_email")]
    pub email: String,
    #[serde(rename = "photoURL", default)]
    #[validate(url)]
    pub photo_url: Option<String>,
    #[validate(
        length(min = 6, message = "Password must be at least 6 characters"),
        custom = "password_strength"
    )]
    pub password: String,
    #[validate(custom = "must_accept")]
    pub terms_accepted: bool,
}

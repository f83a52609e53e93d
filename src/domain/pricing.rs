//! Advisory delivery cost. The backend keeps the authoritative figure.

use super::entities::ParcelType;

pub const DOCUMENT_SAME_REGION: u32 = 60;
pub const DOCUMENT_CROSS_REGION: u32 = 80;
pub const PARCEL_SAME_REGION: u32 = 110;
pub const PARCEL_CROSS_REGION: u32 = 150;
/// Weight covered by the base price, in kg.
pub const INCLUDED_WEIGHT_KG: f64 = 3.0;
pub const PER_EXTRA_KG: u32 = 40;
pub const CROSS_REGION_SURCHARGE: u32 = 40;

/// Itemized cost, as shown on the booking confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CostBreakdown {
    pub same_region: bool,
    pub base: u32,
    pub extra_kg: u32,
    pub extra_weight_cost: u32,
    pub cross_region_surcharge: u32,
    pub total: u32,
}

pub fn compute_cost(
    parcel_type: ParcelType,
    weight: Option<f64>,
    sender_region: &str,
    receiver_region: &str,
) -> u32 {
    quote(parcel_type, weight, sender_region, receiver_region).total
}

pub fn quote(
    parcel_type: ParcelType,
    weight: Option<f64>,
    sender_region: &str,
    receiver_region: &str,
) -> CostBreakdown {
    let same_region = sender_region == receiver_region;

    match parcel_type {
        ParcelType::Document => {
            let base = if same_region {
                DOCUMENT_SAME_REGION
            } else {
                DOCUMENT_CROSS_REGION
            };
            CostBreakdown {
                same_region,
                base,
                extra_kg: 0,
                extra_weight_cost: 0,
                cross_region_surcharge: 0,
                total: base,
            }
        }
        ParcelType::NonDocument => {
            let weight = weight
                .filter(|value| value.is_finite() && *value > 0.0)
                .unwrap_or(0.0);
            let base = if same_region {
                PARCEL_SAME_REGION
            } else {
                PARCEL_CROSS_REGION
            };

            if weight <= INCLUDED_WEIGHT_KG {
                return CostBreakdown {
                    same_region,
                    base,
                    extra_kg: 0,
                    extra_weight_cost: 0,
                    cross_region_surcharge: 0,
                    total: base,
                };
            }

            let extra_kg = (weight - INCLUDED_WEIGHT_KG).ceil() as u32;
            let extra_weight_cost = extra_kg.saturating_mul(PER_EXTRA_KG);
            let cross_region_surcharge = if same_region {
                0
            } else {
                CROSS_REGION_SURCHARGE
            };
            let total = (f64::from(base)
                + f64::from(extra_weight_cost)
                + f64::from(cross_region_surcharge))
            .round() as u32;

            CostBreakdown {
                same_region,
                base,
                extra_kg,
                extra_weight_cost,
                cross_region_surcharge,
                total,
            }
        }
    }
}

//! Parcel, rider and payment domain logic lives here.

pub mod entities;
pub mod forms;
pub mod lifecycle;
pub mod pricing;
pub mod regions;
pub mod riders;
pub mod roles;
pub mod session;

pub use entities::{
    tracking_step_index, AssignedRider, AuthProvider, Parcel, ParcelStatus, ParcelType,
    PaymentRecord, PaymentStatus, PaymentSummary, RecordId, Rider, RiderStatus, RoleInfo,
    TrackingStep, User, VehicleType, TRACKING_STEPS,
};
pub use forms::{ParcelDraft, Registration, RiderApplication};
pub use lifecycle::{
    Actor, InvariantViolation, ParcelTransition, PaymentConfirmation, SideEffect, TransitionError,
};
pub use pricing::{compute_cost, quote, CostBreakdown};
pub use regions::{CoverageArea, REGIONS};
pub use riders::{RiderAction, RiderOutcome, RiderTransition, RiderTransitionError};
pub use roles::{Access, Redirect, Role, RoleError, RoleGate, RoleResolution};
pub use session::{AuthUser, Session};

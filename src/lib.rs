//! ProFast parcel desk: pricing, parcel/rider/payment lifecycles, the admin
//! role gate and a typed client for the delivery backend.

pub mod app;
pub mod domain;
pub mod infra;
pub mod util;

pub mod api;
pub mod cache;
pub mod identity;
pub mod payments;
pub mod scope;

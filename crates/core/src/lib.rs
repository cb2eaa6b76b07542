//! # Open House Core
//!
//! Domain types and booking rules for the open-house appointment service.
//!
//! - **Models**: applications, slot times and the request/response shapes
//! - **Policy**: the fixed booking window and the time grid derived from it
//! - **Store**: the key-value storage trait the allocator is written against
//! - **Allocator**: availability queries and double-booking prevention

pub mod allocator;
pub mod errors;
pub mod models;
pub mod policy;
pub mod store;

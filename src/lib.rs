pub mod attendance;
pub mod auth;
pub mod communication;
pub mod config;
pub mod core;
pub mod database;
pub mod donations;
pub mod entities;
pub mod error;
pub mod events;
pub mod help_requests;
pub mod jobs;
pub mod members;
pub mod onboarding;
pub mod payments;
pub mod reports;
pub mod router;
pub mod routes;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod util;
pub mod volunteers;
pub mod worship;

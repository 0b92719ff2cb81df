// src/models/mod.rs

pub mod account;
pub mod booking;
pub mod consultation;
pub mod content;
pub mod payment;
pub mod service;
pub mod slot;

// Re-export so structs are reachable as crate::models::StructName
pub use account::*;
pub use booking::*;
pub use consultation::*;
pub use content::*;
pub use payment::*;
pub use service::*;
pub use slot::*;

use serde::Serialize;

/// Aggregate counters for the manager dashboard
#[derive(Debug, Serialize, Default)]
pub struct DashboardStats {
    pub total_accounts: i64,
    pub total_services: i64,
    pub pending_bookings: i64,
    pub paid_bookings: i64,
    pub completed_bookings: i64,
    pub tests_awaiting_result: i64,
    pub revenue_total: i64,
    pub upcoming_consultations: i64,
}

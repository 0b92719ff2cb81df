// src/services/mod.rs
//! Orchestration across repositories: the booking lifecycle and the
//! payment flow. Multi-step writes run inside one SQLite transaction.

pub mod booking_service;
pub mod payment_service;

pub use booking_service::{check_detail_transition, BookingService, DetailRemoval};
pub use payment_service::PaymentService;

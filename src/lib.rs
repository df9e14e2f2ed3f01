//! Vedic Origins API Library
//!
//! Order lifecycle and payment-verification backend for the Vedic Origins
//! storefront: cart assembly, COD and prepaid order creation, and Razorpay
//! signature verification.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cart;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod payments;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn order_service(&self) -> Arc<services::orders::OrderService> {
        self.services.orders.clone()
    }

    pub fn verification_service(
        &self,
    ) -> Arc<services::payment_verification::PaymentVerificationService> {
        self.services.verification.clone()
    }
}

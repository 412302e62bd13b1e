//! Agent library for the NotifyGuard CPU alert daemon
//!
//! This crate provides the core functionality for:
//! - Sampling per-account CPU usage (CloudLinux LVE)
//! - Deciding which high-usage readings may raise an alert
//! - Persisting alert history across restarts
//! - Delivering alerts through Telegram
//! - Health checks and observability

pub mod alerting;
pub mod collector;
pub mod health;
pub mod models;
pub mod notifier;
pub mod observability;
pub mod settings;
pub mod state;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use settings::{GuardSettings, TelegramSettings};

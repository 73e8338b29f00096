//! Shared building blocks for the marketplace services.
//!
//! Both HTTP services and the `mp` CLI are assembled from these modules:
//! environment configuration, the Postgres pool, logging, the standard
//! `tower-http` layer stack, Prometheus metrics and the domain rules that
//! are independent of any one API surface (roles, pagination, tag
//! resolution, validation).

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod http;
pub mod listing_status;
pub mod logging;
pub mod metrics;
pub mod migrations;
pub mod pagination;
pub mod password;
pub mod rate_limit;
pub mod roles;
pub mod server;
pub mod service_config;
pub mod tags;
pub mod validation;

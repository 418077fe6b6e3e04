// crates/mcpgate-config/src/lib.rs
// ============================================================================
// Module: Gateway Config Library
// Description: Canonical configuration model and validation.
// Purpose: Single source of truth for the environment variables the gateway
//          binary reads at startup.
// Dependencies: serde, thiserror, url
// ============================================================================

//! ## Overview
//! `mcpgate-config` defines [`GatewayConfig`], the environment-sourced
//! configuration every deployment of the gateway loads once at startup. It
//! provides strict, fail-closed validation: a malformed or missing value
//! is a [`ConfigError`], never a silently-applied default for anything
//! security-relevant.

pub mod config;

pub use config::ConfigError;
pub use config::GatewayConfig;

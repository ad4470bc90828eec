//! # halo-core
//!
//! Foundation types, errors, branded IDs, and utilities for Halo.
//!
//! This crate provides the shared vocabulary that all other Halo crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::SessionId`], [`ids::SocketId`], [`ids::CallId`]
//!   and friends as newtypes
//! - **Call model**: [`call::CallSession`] and the [`call::CallStatus`]
//!   state machine (ai → escalating → human, `ended` absorbing)
//! - **Signaling**: [`signaling::SignalingMessage`] tagged union for the
//!   real-time peer-negotiation channel
//! - **Notifications**: [`notify::NotificationEvent`] lifecycle push payloads
//! - **Audit**: [`audit::CallEvent`] append-only call trail entries
//! - **Tool envelope**: [`tools::ToolEnvelope`] uniform handler result shape
//! - **Errors**: [`errors::HaloError`] taxonomy via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other halo crates.

#![deny(unsafe_code)]

pub mod audit;
pub mod call;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod notify;
pub mod signaling;
pub mod text;
pub mod tools;

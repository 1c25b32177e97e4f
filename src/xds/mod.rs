//! Discovery Protocol Module
//!
//! The boundary between the driver and the control plane. The driver core only
//! sees the [`session::Session`] and [`session::Dialer`] traits; everything
//! below them is one concrete transport.
//!
//! ## Submodules
//! - **`types`**: Discovery request/response documents and the node descriptor.
//! - **`session`**: Session and dialer contracts plus the one-shot termination signal.
//! - **`cache`**: Per-session store of the last configuration received, split into categories.
//! - **`tcp`**: A JSON-lines ADS stream over TCP that ACKs responses and chains EDS/RDS subscriptions.

pub mod cache;
pub mod session;
pub mod tcp;
pub mod types;

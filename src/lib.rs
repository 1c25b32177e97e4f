//! xDS Client Driver Library
//!
//! Simulates a fleet of data-plane clients against a discovery control plane,
//! keeps every client's stream alive across disconnects and exposes what each
//! client has learned.
//!
//! ## Modules
//! - **`identity`**: Node identities presented to the control plane.
//! - **`xds`**: Discovery documents, the session/dialer contracts and a TCP ADS stream.
//! - **`driver`**: The client registry, its reconnect state machine, startup and the HTTP dump.
//! - **`config`**: Runtime settings shared by the binary and the library.

pub mod config;
pub mod driver;
pub mod identity;
pub mod xds;

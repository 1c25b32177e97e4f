//! Node Identity Module
//!
//! Describes the simulated data-plane workloads that the driver presents to the
//! control plane. Each identity carries the fields a sidecar would announce
//! (workload, namespace, node kind, IP, labels) plus a unique `NodeId` that the
//! client registry uses as its lookup key.
//!
//! Identities are plain values: they are created once per logical client and
//! survive any number of session reconnects.

pub mod types;

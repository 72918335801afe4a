//! Identity layer for message-passing trace collection.
//!
//! Traced programs talk about resources through opaque handles:
//! buffer addresses, communicators, requests, datatypes, and so on.
//! Handles are process-local and recycled by the runtime,
//! so they make poor identifiers in a trace.
//! This crate replaces them with small, dense integer [identities]
//! and, for communicators, with [blobs] that mean the same thing
//! on every process of the run.
//! At the end of the run, the [grammar] module flattens the compressed trace
//! and gathers it from all processes into a single file.
//!
//! The [`IdentityLayer`] context object ties the components together.
//! Buffer identities come from a [`MemoryTracker`],
//! which lives outside the layer because allocator interposition
//! must be able to reach it before anything else is set up.
//!
//! [identities]: `Identity`
//! [blobs]: `comm::CommId`

#![warn(missing_docs)]

pub use self::{
    config::*,
    error::*,
    handle::*,
    identity::*,
    layer::*,
    tracker::*,
    transport::*,
};

pub mod comm;
pub mod grammar;
pub mod range_index;
pub mod registry;
pub mod request;

mod config;
mod error;
mod handle;
mod identity;
mod layer;
mod tracker;
mod transport;

#[cfg(test)]
mod loopback;

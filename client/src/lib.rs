//! Celestial Lands client core: the session adapter that talks to the
//! server and the reconciliation engine that turns snapshots into smooth
//! per-frame render positions.

pub mod animation;
pub mod config;
mod connection;
pub mod patrol;
pub mod reconcile;
pub mod session;

//! Types shared between the Celestial Lands server and client: the wire
//! protocol, 2D positions and the simulation defaults both sides agree on.

pub mod config;
pub mod protocol;
pub mod vec2;

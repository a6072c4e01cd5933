//! Policy engine core
//!
//! - [`interval`]: canonical interval sets over 32- and 128-bit domains
//! - [`firewall`]: compiled rule model (actions, criteria, filter sets)
//! - [`services`]: service name to port lookup
//! - [`registry`]: named set and action registry used while compiling
//! - [`compiler`]: configuration records to [`firewall::FilterSet`]
//! - [`packet`]: reference Ethernet frame decoder
//! - [`matcher`]: last-match-wins rule evaluation
//! - [`workers`]: batch evaluation across threads
//! - [`error`]: error types

pub mod compiler;
pub mod error;
pub mod firewall;
pub mod interval;
pub mod matcher;
pub mod packet;
pub mod registry;
pub mod services;
pub mod workers;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;

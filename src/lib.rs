//! Battery management gateway.
//!
//! Polls battery modules over a shared Modbus RTU bus, decodes their register
//! blocks, tracks the rack discharge phase and fans every cycle out to the
//! SNMP value cache, the REST status cache and the database.

pub mod acquisition;
pub mod alarms;
pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod modbus;
pub mod repo;
pub mod sink;
pub mod telemetry;

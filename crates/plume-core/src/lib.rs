//! CO2 plume advection over a square domain, with mosquito populations
//! that search for and track the plume back to its hosts.

pub mod config;
pub mod environment;
pub mod field;
pub mod grid;
pub mod integrator;
pub mod mosquito;
pub mod response;
pub mod simulation;
pub mod spatial;
pub mod wind;

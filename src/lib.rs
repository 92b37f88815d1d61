pub mod bridge;
pub mod cluster;
pub mod config;
pub mod fault;
pub mod learn;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod predict;
pub mod reason;
pub mod reliability;
pub mod telemetry;
pub mod verify;

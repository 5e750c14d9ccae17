pub mod db;
pub mod error;
pub mod listener;
pub mod mqtt;
pub mod push;
pub mod router;
pub mod store;
pub mod telemetry;
pub mod writer;

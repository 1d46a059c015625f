pub mod api;
pub mod config;
pub mod db;
pub mod influx;
pub mod ingest;
pub mod registry;

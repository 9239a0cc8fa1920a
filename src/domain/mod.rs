pub mod commands;
pub mod controller;
pub mod models;
pub mod settings;
pub mod telemetry;

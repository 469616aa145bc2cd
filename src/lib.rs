pub mod aggregate;
pub mod city;
pub mod config;
pub mod db;
pub mod error;
pub mod flatten;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod output;
pub mod params;
pub mod pipeline;
pub mod shape;

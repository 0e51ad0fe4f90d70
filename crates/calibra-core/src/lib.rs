pub mod calibration;
pub mod config;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fingerprint;
pub mod merge;
pub mod model;
pub mod providers;
pub mod registry;
pub mod report;
pub mod review;
pub mod scorer_api;
pub mod storage;

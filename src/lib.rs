//! Acquisition core for a serial-connected physiological sensor board
//! (EEG, dual-channel PPG, IMU quaternion).
//!
//! Data flows one way: `connection` reads bytes, `frame` decodes them into
//! `sensor::Sample`s, `sample_store` keeps the recent window and `hub` fans
//! each sample out to the `recorder` and `live_view` consumers. `upload`
//! pulls windows from the store on its own schedule.

pub mod args;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod hub;
pub mod live_view;
pub mod recorder;
pub mod sample_store;
pub mod sensor;
pub mod upload;

//! Image Analysis Queue Worker
//!
//! This library provides the core of the vision-queue-worker system: a pool of
//! workers that pull image-analysis jobs from a remote queue, run each image
//! through classification and object detection, annotate it, and post the
//! combined result back to the queue.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod worker;

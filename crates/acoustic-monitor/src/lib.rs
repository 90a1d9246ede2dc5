//! # Acoustic Monitor
//!
//! Runtime for the acoustic pest monitor. A [`FieldMonitor`] keeps the sensor
//! registry, drives per-sensor baseline establishment and a global periodic
//! sampling tick, scores readings against baselines, raises alerts and fans
//! state changes out to subscribers.
//!
//! Audio capture and classification are injected through the [`AudioCapture`]
//! and [`Classifier`] traits. [`CommandCapture`] and [`CommandClassifier`] shell
//! out to external programs; [`testing`] has scripted doubles.

pub mod accumulator;
pub mod broadcast;
pub mod capture;
pub mod classifier;
pub mod config;
mod context;
pub mod dispatcher;
pub mod error;
pub mod lease;
mod monitor;
pub mod registry;
mod scheduler;
pub mod store;
pub mod testing;

pub use broadcast::{Broadcaster, Subscription};
pub use capture::{AudioCapture, CaptureError, CommandCapture};
pub use classifier::{Classifier, ClassifierError, CommandClassifier};
pub use config::{DaemonConfig, MonitorConfig};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{BaselineAction, FieldMonitor};
pub use registry::{RegisterRequest, Registration};
pub use scheduler::CaptureState;

// SPDX-License-Identifier: GPL-3.0-only

//! Keyboard Anywhere - a virtual piano on any flat surface
//!
//! A depth sensor looks at a table. Three picked points define where a row
//! of white piano keys lies on it; whenever enough depth points fall inside
//! a key's box the key sounds through MIDI.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: depth sensor sources and MIDI note sinks
//! - [`pipelines`]: projection, calibration, clipping and key detection
//! - [`config`]: user configuration handling
//! - [`storage`]: persistence of the keyboard transform
//! - [`terminal`]: interactive terminal viewer
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load_or_default(None)?;
//! let mut session = Session::from_config(&config, source, sink, Box::new(SystemClock::new()))?;
//! loop {
//!     session.tick()?;
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;
pub mod terminal;

// Re-export commonly used types
pub use backends::audio::{LogSink, MidiSink, NoteSink};
pub use backends::sensor::{DepthFrame, DepthSource, ReplaySource};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use pipelines::calibration::Calibration;
pub use pipelines::keyboard::{Keyboard, NoteEvent};
pub use pipelines::session::{Clock, ManualClock, Session, SystemClock};
pub use storage::TransformStore;

// SPDX-License-Identifier: GPL-3.0-only

//! Hardware-facing backends
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                 Session                   │
//! └──────────┬─────────────────────┬──────────┘
//!            │ poll_frame          │ note_on / note_off
//! ┌──────────┴──────────┐ ┌────────┴──────────┐
//! │  Sensor             │ │  Audio            │
//! │  Kinect (freedepth) │ │  MIDI (midir)     │
//! │  Replay (file)      │ │  Log              │
//! └─────────────────────┘ └───────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`audio`]: note sinks
//! - [`frame_loop`]: capture thread lifecycle
//! - [`sensor`]: depth frame sources

pub mod audio;
pub mod frame_loop;
pub mod sensor;

// SPDX-License-Identifier: GPL-3.0-only

//! Depth-to-keypress pipeline
//!
//! ```text
//! ┌─────────────┐   ┌────────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Depth frame │──▶│ DepthProjector │──▶│ clip to local│──▶│ Key updates │──▶ NoteSink
//! │ (11-bit)    │   │ sensor cloud   │   │ keyboard box │   │ + debounce  │
//! └─────────────┘   └────────────────┘   └──────────────┘   └─────────────┘
//!                                               ▲
//!                   picked points ──▶ Calibration
//! ```
//!
//! # Modules
//!
//! - [`depth`]: raw depth frame to sensor-space point cloud
//! - [`calibration`]: keyboard pose from three points, manual nudges
//! - [`transform`]: sensor space to keyboard-local space with clipping
//! - [`keyboard`]: key layout, per-key press state machine
//! - [`picking`]: 3D point picking for calibration
//! - [`session`]: per-frame driver tying the stages together

pub mod calibration;
pub mod depth;
pub mod keyboard;
pub mod picking;
pub mod session;
pub mod transform;

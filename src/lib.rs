// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 nsrx contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! nsrx: a Nintendo Switch GPU command-engine emulation core
//!
//! This crate emulates the 3D command-processing front end of the GM20B
//! ("Maxwell") GPU and the layer that maps guest-described surfaces onto
//! host-backed images. A pushbuffer decoder upstream feeds decoded
//! (method, argument, last-in-packet) triples into the engine; effects
//! surface as host rendering work and guest-memory writes.
//!
//! # Architecture
//!
//! - [`core::engine`]: Maxwell 3D register file, shadow RAM, macro batching,
//!   and method dispatch
//! - [`core::gfx`]: guest register state translated into host draw state
//! - [`core::gpu`]: host backend contract, texture cache, textures and views
//! - [`core::memory`]: guest GPU address translation contract
//! - [`core::clock`]: monotonic time and GPU tick conversion
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nsrx::core::clock::SystemClock;
//! use nsrx::core::engine::macros::MacroInterpreter;
//! use nsrx::core::engine::{Maxwell3D, SyncpointSet};
//! use nsrx::core::gpu::{Gpu, SoftwareBackend};
//! use nsrx::core::memory::FlatTranslator;
//!
//! struct Interpreter;
//!
//! impl MacroInterpreter for Interpreter {
//!     fn execute(
//!         &mut self,
//!         _engine: &mut Maxwell3D,
//!         _start_offset: u32,
//!         _arguments: &[u32],
//!     ) -> nsrx::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct Syncpoints;
//!
//! impl SyncpointSet for Syncpoints {
//!     fn increment(&self, _id: u16) {}
//! }
//!
//! let gpu = Gpu::new(
//!     Arc::new(SoftwareBackend::new()),
//!     Arc::new(FlatTranslator::new(0x100000)),
//! );
//! let mut engine = Maxwell3D::new(
//!     gpu,
//!     Box::new(Interpreter),
//!     Arc::new(Syncpoints),
//!     Arc::new(SystemClock::new()),
//! );
//!
//! // One decoded guest command: write 1 to the rasterizer enable register
//! engine.call_method(0xDF, 1, true)?;
//! # Ok::<(), nsrx::EmulatorError>(())
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`] which is an alias for
//! `Result<T, EmulatorError>`.

pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};

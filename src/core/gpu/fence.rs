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

//! Completion tokens for in-flight host GPU work
//!
//! A fence cycle marks a batch of host GPU work that touches one or more
//! textures. Whoever submits the work attaches the cycle to the textures it
//! touches; any CPU-side mutation of those textures must wait on the cycle
//! first. Attachment is never automatic.

use parking_lot::{Condvar, Mutex};

/// A one-shot completion token
///
/// Starts unsignaled; [`signal`](FenceCycle::signal) flips it exactly once
/// and wakes all waiters. Shared via `Arc` between the submitter and every
/// texture the submitted work touches.
pub struct FenceCycle {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl FenceCycle {
    /// Create an unsignaled cycle
    pub fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Mark the cycle complete and wake all waiters
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.condvar.notify_all();
    }

    /// Block the calling thread until the cycle is signaled
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.condvar.wait(&mut signaled);
        }
    }

    /// Whether the cycle has been signaled
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }
}

impl Default for FenceCycle {
    fn default() -> Self {
        Self::new()
    }
}

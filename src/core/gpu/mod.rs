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

//! Host GPU services
//!
//! Bundles what the rest of the core needs from the host side: the rendering
//! backend, the guest address translator, and the texture cache built on
//! both. One [`Gpu`] instance is shared (via `Arc`) between the command
//! processing thread and any background or presentation path that creates or
//! queries textures.

pub mod cache;
pub mod fence;
pub mod host;
pub mod software;
pub mod texture;
pub mod wgpu_backend;

use std::sync::Arc;

use crate::core::memory::AddressTranslator;

pub use cache::TextureCache;
pub use fence::FenceCycle;
pub use host::{
    HostBackend, ImageCreateInfo, ImageHandle, ImageLayout, ImageTiling, ImageUsage,
    SubresourceRange,
};
pub use software::SoftwareBackend;
pub use texture::{Backing, GuestTexture, Texture, TextureGuard, TextureView};
pub use wgpu_backend::WgpuBackend;

/// Shared host GPU services
pub struct Gpu {
    /// Host rendering backend
    pub backend: Arc<dyn HostBackend>,

    /// Guest address translator
    pub translator: Arc<dyn AddressTranslator>,

    /// Texture cache over the backend and translator
    pub textures: TextureCache,
}

impl Gpu {
    /// Assemble the GPU services around a backend and translator
    pub fn new(backend: Arc<dyn HostBackend>, translator: Arc<dyn AddressTranslator>) -> Arc<Self> {
        Arc::new(Self {
            textures: TextureCache::new(Arc::clone(&backend), Arc::clone(&translator)),
            backend,
            translator,
        })
    }
}

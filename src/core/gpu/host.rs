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

//! Host rendering backend contract
//!
//! The core never talks to a graphics API directly. Image allocation, layout
//! transitions, clears, copies, and guest-content upload/download all go
//! through [`HostBackend`]. The wgpu
//! implementation lives in [`super::wgpu_backend`]; [`super::software`]
//! provides a CPU-only implementation for headless hosts and tests.

use bitflags::bitflags;

use crate::core::error::Result;

use super::texture::format::Format;
use super::texture::Dimensions;

/// Opaque handle to a host image issued by a [`HostBackend`]
///
/// Handles are only meaningful to the backend that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

bitflags! {
    /// Usage flags requested at image creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ImageUsage: u32 {
        /// The image can be bound as a color attachment
        const COLOR_ATTACHMENT = 1 << 0;

        /// The image can be the source of a transfer
        const TRANSFER_SRC = 1 << 1;

        /// The image can be the destination of a transfer
        const TRANSFER_DST = 1 << 2;

        /// The image can be sampled by shaders
        const SAMPLED = 1 << 3;
    }
}

/// Image memory layout as tracked by the core
///
/// Backends that manage layouts internally (wgpu) may treat transitions as
/// hints; the core still tracks the logical layout for copy validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    /// Contents undefined; must be transitioned before use
    Undefined,

    /// Usable for any access
    General,

    /// Optimal as a transfer source
    TransferSrcOptimal,

    /// Optimal as a transfer destination
    TransferDstOptimal,
}

/// Host-side memory arrangement of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTiling {
    /// Opaque, driver-chosen arrangement
    Optimal,

    /// Row-major rows, CPU-addressable
    Linear,
}

/// A mip/layer window into an image
///
/// `None` counts mean "all remaining levels/layers from the base".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubresourceRange {
    /// First mip level
    pub base_mip_level: u32,

    /// Number of mip levels, or `None` for all remaining
    pub mip_level_count: Option<u32>,

    /// First array layer
    pub base_array_layer: u32,

    /// Number of array layers, or `None` for all remaining
    pub array_layer_count: Option<u32>,
}

impl SubresourceRange {
    /// Resolve the mip level count against a concrete image
    pub fn mip_levels(&self, image_mip_levels: u32) -> u32 {
        self.mip_level_count
            .unwrap_or_else(|| image_mip_levels.saturating_sub(self.base_mip_level))
    }

    /// Resolve the array layer count against a concrete image
    pub fn array_layers(&self, image_layer_count: u32) -> u32 {
        self.array_layer_count
            .unwrap_or_else(|| image_layer_count.saturating_sub(self.base_array_layer))
    }
}

/// Parameters for host image creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCreateInfo {
    /// Extent of the base mip level
    pub dimensions: Dimensions,

    /// Texel format
    pub format: Format,

    /// Requested tiling
    pub tiling: ImageTiling,

    /// Usage flags (transfer src/dst are always implied by the core)
    pub usage: ImageUsage,

    /// Number of mip levels
    pub mip_levels: u32,

    /// Number of array layers
    pub layer_count: u32,

    /// Samples per texel
    pub sample_count: u32,

    /// Layout the image starts in
    pub initial_layout: ImageLayout,
}

/// The host rendering backend consumed by the texture layer
///
/// All operations are synchronous: when a method returns, its effect on the
/// image contents is complete. Backends that internally batch work must
/// flush before returning from `download_image`.
pub trait HostBackend: Send + Sync {
    /// Allocate a host image
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::error::EmulatorError::ImageCreation`] if the
    /// host rejects the parameters or is out of memory.
    fn create_image(&self, info: &ImageCreateInfo) -> Result<ImageHandle>;

    /// Release a host image
    ///
    /// The handle must not be used afterwards.
    fn destroy_image(&self, image: ImageHandle);

    /// Transition an image between layouts
    fn transition_image(&self, image: ImageHandle, from: ImageLayout, to: ImageLayout);

    /// Fill a color image subresource with a clear value
    ///
    /// `value` carries one u32 per channel, interpreted in the image's
    /// format range.
    fn clear_color_image(&self, image: ImageHandle, value: [u32; 4], range: &SubresourceRange);

    /// Copy a subresource range between two images of identical geometry
    fn copy_image(&self, source: ImageHandle, destination: ImageHandle, range: &SubresourceRange);

    /// Upload tightly packed texels into mip 0, layer 0 of an image
    fn upload_image(&self, image: ImageHandle, data: &[u8]) -> Result<()>;

    /// Download mip 0, layer 0 of an image as tightly packed texels
    fn download_image(&self, image: ImageHandle, buffer: &mut [u8]) -> Result<()>;
}

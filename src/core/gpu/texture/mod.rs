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

//! Host-backed textures synchronized with guest surfaces
//!
//! A [`Texture`] wraps one host image and tracks the guest surface it mirrors
//! (if any), the image layout, and any in-flight host GPU work touching it.
//! Textures are shared: the texture cache holds one reference per mapped
//! range and every [`TextureView`] holds another, so a texture lives until
//! its last view is dropped.
//!
//! # Locking
//!
//! All content mutation goes through the texture's own lock. [`Texture::lock`]
//! hands the caller an explicit [`TextureGuard`]; every mutating operation
//! takes that guard as a parameter and the texture never acquires its own
//! lock internally. This keeps multi-texture lock ordering in the caller's
//! hands (a copy locks source and destination in a caller-chosen order).
//! [`Texture::wait_on_backing`] and [`Texture::wait_on_fence`] park the
//! calling thread with the lock released and reacquire it before returning,
//! like a condition wait.

pub mod format;
pub mod layout;

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::core::error::{EmulatorError, Result};
use crate::core::memory::{AddressTranslator, HostRange};

use super::fence::FenceCycle;
use super::host::{
    HostBackend, ImageCreateInfo, ImageHandle, ImageLayout, ImageTiling, ImageUsage,
    SubresourceRange,
};

use format::Format;

/// Extent of an image in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in texels
    pub width: u32,

    /// Height in texels
    pub height: u32,

    /// Depth in texels (1 for non-volume images)
    pub depth: u32,
}

impl Dimensions {
    /// Create an extent
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

/// Guest memory arrangement of a surface
///
/// Refer to Chapter 20.1 of the Tegra X1 TRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileConfig {
    /// Texels arranged linearly
    Linear,

    /// Rows arranged linearly but padded to a pitch in bytes
    Pitch {
        /// Row pitch in bytes
        pitch: u32,
    },

    /// Texels grouped into GOB blocks and Morton-swizzled
    Block {
        /// Height of a block in GOBs
        block_height: u8,

        /// Depth of a block in GOBs
        block_depth: u8,
    },
}

/// Access pattern of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// One-dimensional
    D1,

    /// Two-dimensional
    D2,

    /// Three-dimensional
    D3,

    /// Cubemap (6 faces)
    Cube,

    /// Array of one-dimensional images
    D1Array,

    /// Array of two-dimensional images
    D2Array,

    /// Array of cubemaps
    CubeArray,
}

/// Source selected for one output channel of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwizzleChannel {
    /// Constant zero
    Zero,

    /// Constant one
    One,

    /// Red channel
    Red,

    /// Green channel
    Green,

    /// Blue channel
    Blue,

    /// Alpha channel
    Alpha,
}

/// Per-channel component remapping applied by a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentMapping {
    /// Source for the red output
    pub red: SwizzleChannel,

    /// Source for the green output
    pub green: SwizzleChannel,

    /// Source for the blue output
    pub blue: SwizzleChannel,

    /// Source for the alpha output
    pub alpha: SwizzleChannel,
}

impl Default for ComponentMapping {
    fn default() -> Self {
        Self {
            red: SwizzleChannel::Red,
            green: SwizzleChannel::Green,
            blue: SwizzleChannel::Blue,
            alpha: SwizzleChannel::Alpha,
        }
    }
}

/// A guest surface descriptor
///
/// Describes everything needed to build a host texture mirroring a guest
/// surface: the host-visible byte ranges backing it (in guest order), its
/// geometry, format, and tiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestTexture {
    /// Host ranges backing the surface, in guest address order
    pub mappings: Vec<HostRange>,

    /// Surface extent
    pub dimensions: Dimensions,

    /// Texel format; `None` until a format register write resolves one
    pub format: Option<Format>,

    /// Guest memory arrangement
    pub tile_config: TileConfig,

    /// Access pattern
    pub kind: TextureKind,

    /// First array layer addressed by this descriptor
    pub base_layer: u16,

    /// Number of array layers
    pub layer_count: u16,

    /// Size of one layer in bytes; 0 when no hint is available
    pub layer_stride: u32,
}

impl Default for GuestTexture {
    fn default() -> Self {
        Self {
            mappings: Vec::new(),
            dimensions: Dimensions::new(0, 0, 0),
            format: None,
            tile_config: TileConfig::Linear,
            kind: TextureKind::D2,
            base_layer: 0,
            layer_count: 1,
            layer_stride: 0,
        }
    }
}

/// The host image behind a texture
///
/// Exactly one of the three states holds at any time. `External` images are
/// owned elsewhere (a presentation swapchain, typically) and are never
/// destroyed by the texture; `Owned` images are released through the backend
/// when the texture drops them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// No image; accessors must wait for one to be swapped in
    None,

    /// An image supplied and owned by an external party
    External(ImageHandle),

    /// An image allocated by and owned by this texture
    Owned(ImageHandle),
}

impl Backing {
    /// The image handle, if a backing is present
    pub fn handle(&self) -> Option<ImageHandle> {
        match self {
            Backing::None => None,
            Backing::External(handle) => Some(*handle),
            Backing::Owned(handle) => Some(*handle),
        }
    }
}

/// Lock-protected mutable state of a [`Texture`]
pub struct TextureState {
    pub(crate) backing: Backing,
    pub(crate) guest: Option<GuestTexture>,
    pub(crate) format: Format,
    pub(crate) layout: ImageLayout,
    pub(crate) cycle: Option<Arc<FenceCycle>>,
}

impl TextureState {
    /// Current backing
    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    /// Associated guest descriptor, if any
    pub fn guest(&self) -> Option<&GuestTexture> {
        self.guest.as_ref()
    }

    /// Format currently applied to the backing
    pub fn format(&self) -> Format {
        self.format
    }

    /// Layout the backing was last transitioned to
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Outstanding completion token, if any
    pub fn pending_cycle(&self) -> Option<&Arc<FenceCycle>> {
        self.cycle.as_ref()
    }
}

/// Explicit lock guard over a texture's mutable state
pub type TextureGuard<'a> = MutexGuard<'a, TextureState>;

/// A host-backed image synchronized with an underlying guest surface
pub struct Texture {
    backend: Arc<dyn HostBackend>,
    translator: Arc<dyn AddressTranslator>,
    state: Mutex<TextureState>,
    backing_available: Condvar,
    dimensions: Dimensions,
    tiling: ImageTiling,
    mip_levels: u32,
    layer_count: u32,
    sample_count: u32,
}

impl Texture {
    /// Build a texture for a guest surface, allocating an owned backing
    ///
    /// The new image starts in [`ImageLayout::General`]; block-linear guest
    /// surfaces get optimal host tiling, everything else linear.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor has no format or the host rejects the
    /// allocation.
    pub fn from_guest(
        backend: Arc<dyn HostBackend>,
        translator: Arc<dyn AddressTranslator>,
        guest: GuestTexture,
    ) -> Result<Self> {
        let format = guest.format.ok_or(EmulatorError::UnspecifiedFormat)?;
        let tiling = match guest.tile_config {
            TileConfig::Block { .. } => ImageTiling::Optimal,
            TileConfig::Linear | TileConfig::Pitch { .. } => ImageTiling::Linear,
        };
        let layer_count = guest.layer_count.max(1) as u32;
        let info = ImageCreateInfo {
            dimensions: guest.dimensions,
            format,
            tiling,
            usage: ImageUsage::COLOR_ATTACHMENT
                | ImageUsage::TRANSFER_SRC
                | ImageUsage::TRANSFER_DST
                | ImageUsage::SAMPLED,
            mip_levels: 1,
            layer_count,
            sample_count: 1,
            initial_layout: ImageLayout::General,
        };
        let handle = backend.create_image(&info)?;

        Ok(Self {
            backend,
            translator,
            state: Mutex::new(TextureState {
                backing: Backing::Owned(handle),
                guest: Some(guest.clone()),
                format,
                layout: ImageLayout::General,
                cycle: None,
            }),
            backing_available: Condvar::new(),
            dimensions: guest.dimensions,
            tiling,
            mip_levels: 1,
            layer_count,
            sample_count: 1,
        })
    }

    /// Build a texture around an existing (or absent) backing
    ///
    /// Used for images owned elsewhere, such as presentation targets.
    #[allow(clippy::too_many_arguments)]
    pub fn with_backing(
        backend: Arc<dyn HostBackend>,
        translator: Arc<dyn AddressTranslator>,
        backing: Backing,
        dimensions: Dimensions,
        format: Format,
        layout: ImageLayout,
        tiling: ImageTiling,
        mip_levels: u32,
        layer_count: u32,
        sample_count: u32,
    ) -> Self {
        Self {
            backend,
            translator,
            state: Mutex::new(TextureState {
                backing,
                guest: None,
                format,
                layout,
                cycle: None,
            }),
            backing_available: Condvar::new(),
            dimensions,
            tiling,
            mip_levels,
            layer_count,
            sample_count,
        }
    }

    /// Extent of the base mip level
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Host tiling of the backing
    pub fn tiling(&self) -> ImageTiling {
        self.tiling
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Number of array layers
    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    /// Samples per texel
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Acquire the texture's lock
    ///
    /// The returned guard is passed to every mutating operation. Holding
    /// guards on two textures at once is allowed; the caller owns the
    /// ordering.
    pub fn lock(&self) -> TextureGuard<'_> {
        self.state.lock()
    }

    /// Acquire the lock only if it is uncontended
    pub fn try_lock(&self) -> Option<TextureGuard<'_>> {
        self.state.try_lock()
    }

    /// Block until a backing is present, returning its handle
    ///
    /// Releases the lock while parked and reacquires it before returning.
    pub fn wait_on_backing(&self, guard: &mut TextureGuard<'_>) -> ImageHandle {
        loop {
            if let Some(handle) = guard.backing.handle() {
                return handle;
            }
            self.backing_available.wait(guard);
        }
    }

    /// Wait for any outstanding completion token and clear it
    ///
    /// Releases the lock while parked and reacquires it before returning.
    /// Any operation that needs stable backing contents calls this first.
    pub fn wait_on_fence(&self, guard: &mut TextureGuard<'_>) {
        if let Some(cycle) = guard.cycle.take() {
            MutexGuard::unlocked(guard, || cycle.wait());
        }
    }

    /// Attach a completion token for host GPU work touching this texture
    ///
    /// At most one token is outstanding at a time; the submitter is expected
    /// to wait on (or chain from) any previous token before attaching a new
    /// one.
    pub fn attach_cycle(&self, guard: &mut TextureGuard<'_>, cycle: Arc<FenceCycle>) {
        if let Some(previous) = guard.cycle.replace(cycle) {
            if !previous.is_signaled() {
                log::warn!("replacing an unsignaled fence cycle on a texture");
            }
        }
    }

    /// Install a new backing without copying the previous contents
    ///
    /// Waits out any outstanding completion token first, releases an owned
    /// previous backing, and wakes threads parked in
    /// [`wait_on_backing`](Texture::wait_on_backing) if the new backing is
    /// present. Contents must be carried over out-of-band beforehand if they
    /// are needed.
    pub fn swap_backing(
        &self,
        guard: &mut TextureGuard<'_>,
        backing: Backing,
        layout: ImageLayout,
    ) {
        self.wait_on_fence(guard);

        let previous = std::mem::replace(&mut guard.backing, backing);
        if let Backing::Owned(handle) = previous {
            self.backend.destroy_image(handle);
        }
        guard.layout = layout;

        if guard.backing.handle().is_some() {
            self.backing_available.notify_all();
        }
    }

    /// Transition the backing to `layout`
    ///
    /// Does nothing if the backing is already in that layout.
    pub fn transition_layout(&self, guard: &mut TextureGuard<'_>, layout: ImageLayout) {
        self.wait_on_fence(guard);
        let handle = self.wait_on_backing(guard);

        if guard.layout != layout {
            self.backend.transition_image(handle, guard.layout, layout);
            guard.layout = layout;
        }
    }

    /// Reinterpret the backing under a new format
    ///
    /// # Errors
    ///
    /// Fatal if the new format's texel layout (bytes per block, block
    /// dimensions) differs from the current one.
    pub fn set_format(&self, guard: &mut TextureGuard<'_>, format: Format) -> Result<()> {
        if !guard.format.is_compatible(format) {
            return Err(EmulatorError::IncompatibleFormat {
                from: guard.format,
                to: format,
            });
        }
        guard.format = format;
        Ok(())
    }

    /// Copy the guest surface's contents into the host backing
    ///
    /// Gathers the descriptor's mapped ranges, converts out of the guest
    /// tiling arrangement, and uploads the packed texels.
    ///
    /// # Errors
    ///
    /// Requires an attached guest descriptor; translation failures on the
    /// mapped ranges propagate.
    pub fn synchronize_host(&self, guard: &mut TextureGuard<'_>) -> Result<()> {
        let guest = guard
            .guest
            .clone()
            .ok_or(EmulatorError::MissingGuestDescriptor)?;
        self.wait_on_fence(guard);
        let handle = self.wait_on_backing(guard);

        let format = guard.format;
        let info = format.info();
        let guest_size =
            layout::guest_surface_size(self.dimensions, info, &guest.tile_config) as usize;
        let mut guest_bytes = vec![0u8; guest_size];
        read_guest(self.translator.as_ref(), &guest.mappings, &mut guest_bytes)?;

        let mut packed = vec![0u8; format.size(self.dimensions) as usize];
        match guest.tile_config {
            TileConfig::Linear => {
                let count = packed.len().min(guest_bytes.len());
                packed[..count].copy_from_slice(&guest_bytes[..count]);
            }
            TileConfig::Pitch { pitch } => {
                layout::pitch_to_packed(&guest_bytes, &mut packed, self.dimensions, info, pitch);
            }
            TileConfig::Block { block_height, .. } => {
                layout::block_linear_to_packed(
                    &guest_bytes,
                    &mut packed,
                    self.dimensions,
                    info,
                    block_height,
                );
            }
        }

        self.backend.upload_image(handle, &packed)
    }

    /// Copy the host backing's contents back into the guest surface
    ///
    /// The inverse of [`synchronize_host`](Texture::synchronize_host):
    /// downloads the packed texels, converts into the guest tiling
    /// arrangement, and scatters them over the descriptor's mapped ranges.
    pub fn synchronize_guest(&self, guard: &mut TextureGuard<'_>) -> Result<()> {
        let guest = guard
            .guest
            .clone()
            .ok_or(EmulatorError::MissingGuestDescriptor)?;
        self.wait_on_fence(guard);
        let handle = self.wait_on_backing(guard);

        let format = guard.format;
        let info = format.info();
        let mut packed = vec![0u8; format.size(self.dimensions) as usize];
        self.backend.download_image(handle, &mut packed)?;

        let guest_size =
            layout::guest_surface_size(self.dimensions, info, &guest.tile_config) as usize;
        let mut guest_bytes = vec![0u8; guest_size];
        match guest.tile_config {
            TileConfig::Linear => {
                let count = packed.len().min(guest_bytes.len());
                guest_bytes[..count].copy_from_slice(&packed[..count]);
            }
            TileConfig::Pitch { pitch } => {
                layout::packed_to_pitch(&packed, &mut guest_bytes, self.dimensions, info, pitch);
            }
            TileConfig::Block { block_height, .. } => {
                layout::packed_to_block_linear(
                    &packed,
                    &mut guest_bytes,
                    self.dimensions,
                    info,
                    block_height,
                );
            }
        }

        write_guest(self.translator.as_ref(), &guest.mappings, &guest_bytes)
    }

    /// Copy a subresource range from another texture's backing
    ///
    /// The caller locks both textures and passes both guards, which keeps
    /// the lock acquisition order at the call site.
    ///
    /// # Errors
    ///
    /// Fatal if the source layout is undefined or the geometries or formats
    /// differ.
    pub fn copy_from(
        &self,
        guard: &mut TextureGuard<'_>,
        source: &Texture,
        source_guard: &mut TextureGuard<'_>,
        range: &SubresourceRange,
    ) -> Result<()> {
        if source_guard.layout == ImageLayout::Undefined {
            return Err(EmulatorError::CopyFromUndefinedLayout);
        }
        if source.dimensions != self.dimensions {
            return Err(EmulatorError::CopyDimensionsMismatch);
        }
        if source_guard.format != guard.format {
            return Err(EmulatorError::CopyFormatMismatch);
        }

        source.wait_on_fence(source_guard);
        let source_handle = source.wait_on_backing(source_guard);
        self.wait_on_fence(guard);
        let handle = self.wait_on_backing(guard);

        self.backend.copy_image(source_handle, handle, range);
        Ok(())
    }

    /// Create a view onto this texture
    ///
    /// `format` defaults to the texture's current format. The view holds a
    /// shared reference keeping the texture alive.
    pub fn view(
        self: &Arc<Self>,
        format: Option<Format>,
        kind: TextureKind,
        range: SubresourceRange,
        mapping: ComponentMapping,
    ) -> Arc<TextureView> {
        let format = format.unwrap_or_else(|| self.state.lock().format);
        Arc::new(TextureView {
            texture: Arc::clone(self),
            kind,
            format,
            mapping,
            range,
        })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Backing::Owned(handle) = state.backing {
            self.backend.destroy_image(handle);
        }
    }
}

/// A projection of a [`Texture`] subresource
///
/// Views may override the format (to a texel-layout-compatible one), remap
/// components, and narrow the mip/layer window. The shared `texture`
/// reference keeps the backing alive for the view's lifetime.
pub struct TextureView {
    /// The texture this view projects
    pub texture: Arc<Texture>,

    /// Access pattern of the view
    pub kind: TextureKind,

    /// Format the view reads the backing under
    pub format: Format,

    /// Component remapping
    pub mapping: ComponentMapping,

    /// Subresource window
    pub range: SubresourceRange,
}

impl std::fmt::Debug for TextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureView")
            .field("kind", &self.kind)
            .field("format", &self.format)
            .field("mapping", &self.mapping)
            .field("range", &self.range)
            .finish()
    }
}

/// Gather bytes from mapped ranges into `buffer`, front to back
fn read_guest(
    translator: &dyn AddressTranslator,
    mappings: &[HostRange],
    buffer: &mut [u8],
) -> Result<()> {
    let mut offset = 0usize;
    for range in mappings {
        if offset >= buffer.len() {
            break;
        }
        let len = (range.size as usize).min(buffer.len() - offset);
        translator.read(
            HostRange {
                address: range.address,
                size: len as u64,
            },
            &mut buffer[offset..offset + len],
        )?;
        offset += len;
    }
    Ok(())
}

/// Scatter `buffer` over mapped ranges, front to back
fn write_guest(
    translator: &dyn AddressTranslator,
    mappings: &[HostRange],
    buffer: &[u8],
) -> Result<()> {
    let mut offset = 0usize;
    for range in mappings {
        if offset >= buffer.len() {
            break;
        }
        let len = (range.size as usize).min(buffer.len() - offset);
        translator.write(
            HostRange {
                address: range.address,
                size: len as u64,
            },
            &buffer[offset..offset + len],
        )?;
        offset += len;
    }
    Ok(())
}

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

//! Host-equivalent graphics state
//!
//! Translates register-level guest state (render targets, viewports,
//! scissors, clears) into host draw state, resolving textures through the
//! texture cache only when the state is actually consumed.
//!
//! This type runs on the single command-processing thread and is not
//! reentrant; it takes no locks of its own. Only the textures it resolves
//! are shared with other threads, each behind its own lock.

use std::sync::Arc;

use crate::core::engine::registers::{ClearBuffers, RenderTargetControl, ScissorBounds};
use crate::core::error::{EmulatorError, Result};
use crate::core::gpu::host::SubresourceRange;
use crate::core::gpu::texture::format::Format;
use crate::core::gpu::texture::{Dimensions, GuestTexture, TextureView, TileConfig};
use crate::core::gpu::Gpu;

/// Number of render target slots
pub const RENDER_TARGET_COUNT: usize = 8;

/// Number of viewport/scissor slots
pub const VIEWPORT_COUNT: usize = 16;

/// A host-space viewport rectangle with depth range
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    /// Left edge in pixels
    pub x: f32,

    /// Top edge in pixels
    pub y: f32,

    /// Width in pixels
    pub width: f32,

    /// Height in pixels
    pub height: f32,

    /// Near depth bound
    pub min_depth: f32,

    /// Far depth bound
    pub max_depth: f32,
}

/// A host-space scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    /// Left edge
    pub offset_x: i32,

    /// Top edge
    pub offset_y: i32,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,
}

/// A scissor that masks nothing, used while a slot's scissor is disabled
pub const DEFAULT_SCISSOR: ScissorRect = ScissorRect {
    offset_x: 0,
    offset_y: 0,
    width: i32::MAX as u32,
    height: i32::MAX as u32,
};

/// One guest render target slot
struct RenderTarget {
    /// Unbound attachment when set; controlled by the format register
    disabled: bool,

    /// High half of the guest address (written as a separate register)
    address_high: u32,

    /// Low half of the guest address
    address_low: u32,

    /// Descriptor assembled from the slot's registers
    guest: GuestTexture,

    /// View resolved from the cache, dropped on any relevant state change
    view: Option<Arc<TextureView>>,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self {
            disabled: false,
            address_high: 0,
            address_low: 0,
            guest: GuestTexture {
                // Depth defaults to 1; the guest has no register to change it
                dimensions: Dimensions::new(0, 0, 1),
                ..GuestTexture::default()
            },
            view: None,
        }
    }
}

impl RenderTarget {
    fn address(&self) -> u64 {
        (u64::from(self.address_high) << 32) | u64::from(self.address_low)
    }
}

/// Guest graphics state translated to host terms
pub struct GraphicsContext {
    gpu: Arc<Gpu>,
    render_targets: [RenderTarget; RENDER_TARGET_COUNT],
    render_target_control: RenderTargetControl,
    viewports: [Viewport; VIEWPORT_COUNT],
    clear_color: [u32; 4],
    scissors: [ScissorRect; VIEWPORT_COUNT],
}

impl GraphicsContext {
    /// Create a context over the shared GPU services
    pub fn new(gpu: Arc<Gpu>) -> Self {
        Self {
            gpu,
            render_targets: std::array::from_fn(|_| RenderTarget::default()),
            render_target_control: RenderTargetControl(0),
            viewports: [Viewport::default(); VIEWPORT_COUNT],
            clear_color: [0; 4],
            scissors: [DEFAULT_SCISSOR; VIEWPORT_COUNT],
        }
    }

    /* Render targets */

    /// Set the high half of a render target's guest address
    pub fn set_render_target_address_high(&mut self, index: usize, high: u32) {
        let target = &mut self.render_targets[index];
        target.address_high = high;
        target.guest.mappings.clear();
        target.view = None;
    }

    /// Set the low half of a render target's guest address
    pub fn set_render_target_address_low(&mut self, index: usize, low: u32) {
        let target = &mut self.render_targets[index];
        target.address_low = low;
        target.guest.mappings.clear();
        target.view = None;
    }

    /// Set a render target's width in texels
    pub fn set_render_target_width(&mut self, index: usize, width: u32) {
        let target = &mut self.render_targets[index];
        target.guest.dimensions.width = width;
        target.guest.mappings.clear();
        target.view = None;
    }

    /// Set a render target's height in texels
    pub fn set_render_target_height(&mut self, index: usize, height: u32) {
        let target = &mut self.render_targets[index];
        target.guest.dimensions.height = height;
        target.guest.mappings.clear();
        target.view = None;
    }

    /// Set a render target's format; `None` disables the slot
    ///
    /// The format determines the surface's byte length, so resolved mappings
    /// are dropped along with the cached view.
    pub fn set_render_target_format(&mut self, index: usize, format: Option<Format>) {
        let target = &mut self.render_targets[index];
        target.guest.format = format;
        target.disabled = format.is_none();
        target.guest.mappings.clear();
        target.view = None;
    }

    /// Set a render target's guest tiling arrangement
    pub fn set_render_target_tile_config(&mut self, index: usize, tile_config: TileConfig) {
        let target = &mut self.render_targets[index];
        target.guest.tile_config = tile_config;
        target.view = None;
    }

    /// Set a render target's array layer count
    pub fn set_render_target_layer_count(&mut self, index: usize, layer_count: u16) {
        let target = &mut self.render_targets[index];
        target.guest.layer_count = layer_count;
        target.view = None;
    }

    /// Set a render target's layer stride in bytes
    pub fn set_render_target_layer_stride(&mut self, index: usize, layer_stride: u32) {
        let target = &mut self.render_targets[index];
        target.guest.layer_stride = layer_stride;
        target.view = None;
    }

    /// Set a render target's first addressed array layer
    ///
    /// # Errors
    ///
    /// Fatal if `base_layer` exceeds the 16-bit layer index range.
    pub fn set_render_target_base_layer(&mut self, index: usize, base_layer: u32) -> Result<()> {
        if base_layer > u16::MAX as u32 {
            return Err(EmulatorError::BaseLayerOutOfRange { base_layer });
        }
        let target = &mut self.render_targets[index];
        target.guest.base_layer = base_layer as u16;
        target.view = None;
        Ok(())
    }

    /// Resolve a render target slot to a texture view
    ///
    /// Returns the cached view when present. Otherwise resolves the slot's
    /// guest mappings (if needed) through the address translator and asks
    /// the texture cache for a matching texture.
    ///
    /// Returns `Ok(None)` for a disabled slot, a slot with no format, or a
    /// slot whose guest range cannot currently be translated (logged).
    pub fn render_target(&mut self, index: usize) -> Result<Option<Arc<TextureView>>> {
        let target = &mut self.render_targets[index];
        if target.disabled {
            return Ok(None);
        }
        if let Some(view) = &target.view {
            return Ok(Some(Arc::clone(view)));
        }
        let Some(format) = target.guest.format else {
            return Ok(None);
        };

        if target.guest.mappings.is_empty() {
            let layers =
                u64::from(target.guest.layer_count).saturating_sub(u64::from(target.guest.base_layer));
            let size =
                (u64::from(target.guest.layer_stride) * layers).max(format.size(target.guest.dimensions));
            match self.gpu.translator.translate(target.address(), size) {
                Ok(mappings) => target.guest.mappings = mappings,
                Err(error) => {
                    log::warn!("render target {} is unavailable: {}", index, error);
                    return Ok(None);
                }
            }
        }

        let view = self.gpu.textures.find_or_create(&target.guest)?;
        target.view = Some(Arc::clone(&view));
        Ok(Some(view))
    }

    /// Peek at a slot's cached view without resolving anything
    pub fn cached_render_target(&self, index: usize) -> Option<&Arc<TextureView>> {
        self.render_targets[index].view.as_ref()
    }

    /// Replace the render target control mapping
    pub fn update_render_target_control(&mut self, control: RenderTargetControl) {
        self.render_target_control = control;
    }

    /* Viewport transforms */

    /// Derive a viewport's X origin and width from the guest transform
    ///
    /// The guest submits a scale/translate pair per axis; the host wants
    /// origin and extent. Origin undoes the half-extent offset the transform
    /// bakes into the translation, extent undoes the halving of the scale.
    pub fn set_viewport_x(&mut self, index: usize, scale: f32, translate: f32) {
        let viewport = &mut self.viewports[index];
        viewport.x = scale - translate;
        viewport.width = scale * 2.0;
    }

    /// Derive a viewport's Y origin and height from the guest transform
    pub fn set_viewport_y(&mut self, index: usize, scale: f32, translate: f32) {
        let viewport = &mut self.viewports[index];
        viewport.y = scale - translate;
        viewport.height = scale * 2.0;
    }

    /// Derive a viewport's depth range from the guest transform
    pub fn set_viewport_z(&mut self, index: usize, scale: f32, translate: f32) {
        let viewport = &mut self.viewports[index];
        viewport.min_depth = translate;
        viewport.max_depth = scale + translate;
    }

    /// Current host viewport for a slot
    pub fn viewport(&self, index: usize) -> &Viewport {
        &self.viewports[index]
    }

    /* Buffer clears */

    /// Update one channel of the clear color value
    pub fn update_clear_color(&mut self, channel: usize, value: u32) {
        self.clear_color[channel] = value;
    }

    /// Current clear color (raw channel words)
    pub fn clear_color(&self) -> [u32; 4] {
        self.clear_color
    }

    /// Execute a buffer-clear trigger
    ///
    /// Resolves the addressed slot through the render target control
    /// mapping, locks the backing texture, and clears the addressed layer
    /// through the host backend. Partial channel masks are not supported
    /// and clear every channel with a warning.
    pub fn clear_buffers(&mut self, clear: ClearBuffers) -> Result<()> {
        let any_color = clear.red() || clear.green() || clear.blue() || clear.alpha();
        if !any_color {
            if clear.depth() || clear.stencil() {
                log::warn!("depth/stencil clears are not supported");
            }
            return Ok(());
        }
        if !(clear.red() && clear.green() && clear.blue() && clear.alpha()) {
            log::warn!(
                "partial channel clear (mask r={} g={} b={} a={}) clears all channels",
                clear.red(),
                clear.green(),
                clear.blue(),
                clear.alpha()
            );
        }

        let slot = self.render_target_control.map(clear.render_target_id() as usize);
        let Some(view) = self.render_target(slot)? else {
            return Ok(());
        };

        let texture = Arc::clone(&view.texture);
        let mut guard = texture.lock();
        texture.wait_on_fence(&mut guard);
        let handle = texture.wait_on_backing(&mut guard);
        self.gpu.backend.clear_color_image(
            handle,
            self.clear_color,
            &SubresourceRange {
                base_mip_level: 0,
                mip_level_count: Some(1),
                base_array_layer: view.range.base_array_layer + u32::from(clear.layer_id()),
                array_layer_count: Some(1),
            },
        );
        Ok(())
    }

    /* Viewport scissors */

    /// Enable a slot's scissor with the given bounds, or disable it
    ///
    /// Disabling substitutes [`DEFAULT_SCISSOR`], which masks nothing.
    pub fn set_scissor(
        &mut self,
        index: usize,
        bounds: Option<(ScissorBounds, ScissorBounds)>,
    ) {
        self.scissors[index] = match bounds {
            Some((horizontal, vertical)) => ScissorRect {
                offset_x: i32::from(horizontal.minimum()),
                offset_y: i32::from(vertical.minimum()),
                width: u32::from(horizontal.maximum()),
                height: u32::from(vertical.maximum()),
            },
            None => DEFAULT_SCISSOR,
        };
    }

    /// Update only the horizontal bounds of a slot's scissor
    pub fn set_scissor_horizontal(&mut self, index: usize, bounds: ScissorBounds) {
        let scissor = &mut self.scissors[index];
        scissor.offset_x = i32::from(bounds.minimum());
        scissor.width = u32::from(bounds.maximum());
    }

    /// Update only the vertical bounds of a slot's scissor
    pub fn set_scissor_vertical(&mut self, index: usize, bounds: ScissorBounds) {
        let scissor = &mut self.scissors[index];
        scissor.offset_y = i32::from(bounds.minimum());
        scissor.height = u32::from(bounds.maximum());
    }

    /// Current scissor rectangle for a slot
    pub fn scissor(&self, index: usize) -> &ScissorRect {
        &self.scissors[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::software::SoftwareBackend;
    use crate::core::memory::FlatTranslator;

    fn context() -> GraphicsContext {
        let backend = Arc::new(SoftwareBackend::new());
        let translator = Arc::new(FlatTranslator::new(0x100000));
        GraphicsContext::new(Gpu::new(backend, translator))
    }

    fn context_with_backend() -> (GraphicsContext, Arc<SoftwareBackend>) {
        let backend = Arc::new(SoftwareBackend::new());
        let translator = Arc::new(FlatTranslator::new(0x100000));
        let gpu = Gpu::new(backend.clone(), translator);
        (GraphicsContext::new(gpu), backend)
    }

    fn bind_render_target(context: &mut GraphicsContext, index: usize, address: u32) {
        context.set_render_target_address_low(index, address);
        context.set_render_target_width(index, 16);
        context.set_render_target_height(index, 16);
        context.set_render_target_format(index, Some(Format::R8G8B8A8Unorm));
        context.set_render_target_tile_config(index, TileConfig::Linear);
        context.set_render_target_layer_count(index, 1);
    }

    #[test]
    fn test_viewport_axes_combine_scale_and_translate() {
        let mut context = context();
        context.set_viewport_x(3, 2.0, 1.0);
        context.set_viewport_y(3, 3.0, 0.0);

        let viewport = context.viewport(3);
        assert_eq!(viewport.x, 1.0);
        assert_eq!(viewport.width, 4.0);
        assert_eq!(viewport.y, 3.0);
        assert_eq!(viewport.height, 6.0);
    }

    #[test]
    fn test_viewport_depth_axis() {
        let mut context = context();
        context.set_viewport_z(0, 0.5, 0.25);

        let viewport = context.viewport(0);
        assert_eq!(viewport.min_depth, 0.25);
        assert_eq!(viewport.max_depth, 0.75);
    }

    #[test]
    fn test_scissor_disable_restores_default() {
        let mut context = context();
        context.set_scissor(
            2,
            Some((ScissorBounds::new(10, 100), ScissorBounds::new(20, 200))),
        );
        assert_eq!(
            *context.scissor(2),
            ScissorRect {
                offset_x: 10,
                offset_y: 20,
                width: 100,
                height: 200,
            }
        );

        context.set_scissor(2, None);
        assert_eq!(*context.scissor(2), DEFAULT_SCISSOR);
    }

    #[test]
    fn test_scissor_axes_update_independently() {
        let mut context = context();
        context.set_scissor_horizontal(0, ScissorBounds::new(4, 40));
        context.set_scissor_vertical(0, ScissorBounds::new(8, 80));

        let scissor = context.scissor(0);
        assert_eq!(
            (scissor.offset_x, scissor.width, scissor.offset_y, scissor.height),
            (4, 40, 8, 80)
        );
    }

    #[test]
    fn test_render_target_resolves_and_caches() {
        let mut context = context();
        bind_render_target(&mut context, 0, 0x1000);

        let first = context.render_target(0).unwrap().unwrap();
        let second = context.render_target(0).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_disabled_render_target_resolves_to_none() {
        let mut context = context();
        bind_render_target(&mut context, 1, 0x1000);
        context.set_render_target_format(1, None);
        assert!(context.render_target(1).unwrap().is_none());
    }

    #[test]
    fn test_format_change_rebuilds_view_but_reuses_texture() {
        let mut context = context();
        bind_render_target(&mut context, 0, 0x1000);

        let before = context.render_target(0).unwrap().unwrap();
        context.set_render_target_format(0, Some(Format::R5G6B5Unorm));
        assert!(context.cached_render_target(0).is_none());

        let after = context.render_target(0).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&before.texture, &after.texture));
        assert_eq!(after.format, Format::R5G6B5Unorm);
    }

    #[test]
    fn test_untranslatable_render_target_is_unavailable() {
        let backend = Arc::new(SoftwareBackend::new());
        let translator = Arc::new(FlatTranslator::new(0x100)); // far too small
        let mut context = GraphicsContext::new(Gpu::new(backend, translator));
        bind_render_target(&mut context, 0, 0x1000);

        assert!(context.render_target(0).unwrap().is_none());
    }

    #[test]
    fn test_base_layer_range_is_enforced() {
        let mut context = context();
        assert_eq!(
            context.set_render_target_base_layer(0, 0x10000),
            Err(EmulatorError::BaseLayerOutOfRange { base_layer: 0x10000 })
        );
        assert!(context.set_render_target_base_layer(0, 0xFFFF).is_ok());
    }

    #[test]
    fn test_clear_buffers_clears_mapped_target() {
        let (mut context, backend) = context_with_backend();
        bind_render_target(&mut context, 0, 0x2000);
        for channel in 0..4 {
            context.update_clear_color(channel, 0x40 + channel as u32);
        }

        // All four color channels, render target id 0, layer 0
        context.clear_buffers(ClearBuffers(0b111100)).unwrap();
        assert_eq!(backend.clear_count(), 1);

        let view = context.render_target(0).unwrap().unwrap();
        let guard = view.texture.lock();
        let data = backend.image_data(guard.backing().handle().unwrap()).unwrap();
        assert_eq!(&data[..4], &[0x40, 0x41, 0x42, 0x43]);
    }

    #[test]
    fn test_clear_buffers_without_color_flags_is_a_no_op() {
        let (mut context, backend) = context_with_backend();
        bind_render_target(&mut context, 0, 0x2000);

        // Depth-only clear
        context.clear_buffers(ClearBuffers(0b1)).unwrap();
        assert_eq!(backend.clear_count(), 0);
    }
}

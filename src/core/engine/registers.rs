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

//! 3D engine register map and field decoding
//!
//! The engine exposes a register file of 32-bit words, one per guest method
//! index, mirroring the hardware's method space (the offsets below follow
//! the deko3d/nouveau register listings for the Maxwell 3D class). Packed
//! registers are decoded with explicit shift/mask accessors on `u32`
//! newtypes.

use crate::core::gpu::texture::TileConfig;

/// Number of addressable engine registers
///
/// Methods at or above this index address macro control space instead.
pub const REGISTER_COUNT: usize = 0xE00;

/// Register offsets (method indices)
pub mod offset {
    /// MME instruction RAM write pointer
    pub const MME_INSTRUCTION_RAM_POINTER: usize = 0x45;

    /// MME instruction RAM load port (writes append at the pointer)
    pub const MME_INSTRUCTION_RAM_LOAD: usize = 0x46;

    /// MME start-address table write pointer
    pub const MME_START_ADDRESS_RAM_POINTER: usize = 0x47;

    /// MME start-address table load port
    pub const MME_START_ADDRESS_RAM_LOAD: usize = 0x48;

    /// Shadow RAM control register
    pub const MME_SHADOW_RAM_CONTROL: usize = 0x49;

    /// Syncpoint action trigger
    pub const SYNCPOINT_ACTION: usize = 0xB2;

    /// Rasterizer enable
    pub const RASTERIZER_ENABLE: usize = 0xDF;

    /// First render target register block
    pub const RENDER_TARGET_BASE: usize = 0x200;

    /// Words per render target block
    pub const RENDER_TARGET_WORDS: usize = 0x10;

    /// Last word of the render target blocks
    pub const RENDER_TARGET_LAST: usize =
        RENDER_TARGET_BASE + RENDER_TARGET_WORDS * crate::core::gfx::RENDER_TARGET_COUNT - 1;

    /// Render target block word: address high half
    pub const RENDER_TARGET_ADDRESS_HIGH: usize = 0x0;

    /// Render target block word: address low half
    pub const RENDER_TARGET_ADDRESS_LOW: usize = 0x1;

    /// Render target block word: width
    pub const RENDER_TARGET_WIDTH: usize = 0x2;

    /// Render target block word: height
    pub const RENDER_TARGET_HEIGHT: usize = 0x3;

    /// Render target block word: color format
    pub const RENDER_TARGET_FORMAT: usize = 0x4;

    /// Render target block word: tile mode
    pub const RENDER_TARGET_TILE_MODE: usize = 0x5;

    /// Render target block word: array mode
    pub const RENDER_TARGET_ARRAY_MODE: usize = 0x6;

    /// Render target block word: layer stride, shifted right by 2
    pub const RENDER_TARGET_LAYER_STRIDE: usize = 0x7;

    /// Render target block word: base array layer
    pub const RENDER_TARGET_BASE_LAYER: usize = 0x8;

    /// First viewport transform block
    pub const VIEWPORT_TRANSFORM_BASE: usize = 0x280;

    /// Words per viewport transform block
    pub const VIEWPORT_TRANSFORM_WORDS: usize = 0x8;

    /// Last word of the viewport transform blocks
    pub const VIEWPORT_TRANSFORM_LAST: usize =
        VIEWPORT_TRANSFORM_BASE + VIEWPORT_TRANSFORM_WORDS * crate::core::gfx::VIEWPORT_COUNT - 1;

    /// Viewport transform word: X scale
    pub const VIEWPORT_SCALE_X: usize = 0x0;

    /// Viewport transform word: Y scale
    pub const VIEWPORT_SCALE_Y: usize = 0x1;

    /// Viewport transform word: Z scale
    pub const VIEWPORT_SCALE_Z: usize = 0x2;

    /// Viewport transform word: X translate
    pub const VIEWPORT_TRANSLATE_X: usize = 0x3;

    /// Viewport transform word: Y translate
    pub const VIEWPORT_TRANSLATE_Y: usize = 0x4;

    /// Viewport transform word: Z translate
    pub const VIEWPORT_TRANSLATE_Z: usize = 0x5;

    /// First viewport (derived origin/extent) block; 4 words per slot
    pub const VIEWPORT_BASE: usize = 0x300;

    /// Viewport block word: near depth bound
    pub const VIEWPORT_DEPTH_NEAR: usize = 0x2;

    /// Viewport block word: far depth bound
    pub const VIEWPORT_DEPTH_FAR: usize = 0x3;

    /// Words per viewport block
    pub const VIEWPORT_WORDS: usize = 0x4;

    /// Clear color value, one word per RGBA channel
    pub const CLEAR_COLOR_BASE: usize = 0x360;

    /// Last clear color channel word
    pub const CLEAR_COLOR_LAST: usize = CLEAR_COLOR_BASE + 3;

    /// First scissor block
    pub const SCISSOR_BASE: usize = 0x380;

    /// Words per scissor block
    pub const SCISSOR_WORDS: usize = 0x4;

    /// Last word of the scissor blocks
    pub const SCISSOR_LAST: usize =
        SCISSOR_BASE + SCISSOR_WORDS * crate::core::gfx::VIEWPORT_COUNT - 1;

    /// Scissor block word: enable
    pub const SCISSOR_ENABLE: usize = 0x0;

    /// Scissor block word: horizontal bounds
    pub const SCISSOR_HORIZONTAL: usize = 0x1;

    /// Scissor block word: vertical bounds
    pub const SCISSOR_VERTICAL: usize = 0x2;

    /// Render target control mapping
    pub const RENDER_TARGET_CONTROL: usize = 0x487;

    /// Depth target enable
    pub const DEPTH_TARGET_ENABLE: usize = 0x54E;

    /// Viewport transform enable
    pub const VIEWPORT_TRANSFORM_ENABLE: usize = 0x64B;

    /// Buffer clear trigger
    pub const CLEAR_BUFFERS: usize = 0x674;

    /// Semaphore guest address, high half
    pub const SEMAPHORE_ADDRESS_HIGH: usize = 0x6C0;

    /// Semaphore guest address, low half
    pub const SEMAPHORE_ADDRESS_LOW: usize = 0x6C1;

    /// Semaphore payload
    pub const SEMAPHORE_PAYLOAD: usize = 0x6C2;

    /// Semaphore info; writing it triggers the configured operation
    pub const SEMAPHORE_INFO: usize = 0x6C3;

    /// Firmware call argument window
    pub const FIRMWARE_CALL_BASE: usize = 0x8C0;

    /// Firmware call slot 4; written by guest driver initialization
    pub const FIRMWARE_CALL_4: usize = FIRMWARE_CALL_BASE + 4;

    /// Scratch register the slot-4 firmware call reports success through
    pub const FIRMWARE_SCRATCH: usize = 0xD00;
}

/// Shadow RAM behavior selected by the shadow control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowRamControl {
    /// Track writes into shadow RAM
    #[default]
    Track,

    /// Track writes into shadow RAM with a filter
    TrackWithFilter,

    /// No shadow interaction
    Passthrough,

    /// Replay previously tracked values, discarding incoming writes
    Replay,
}

impl ShadowRamControl {
    /// Decode the raw register value
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ShadowRamControl::Track,
            1 => ShadowRamControl::TrackWithFilter,
            3 => ShadowRamControl::Replay,
            _ => ShadowRamControl::Passthrough,
        }
    }
}

/// Syncpoint action register
#[derive(Debug, Clone, Copy)]
pub struct SyncpointAction(pub u32);

impl SyncpointAction {
    /// Syncpoint index to act on
    pub fn id(self) -> u16 {
        (self.0 & 0xFFF) as u16
    }

    /// Whether caches flush before the action
    pub fn flush_cache(self) -> bool {
        self.0 & (1 << 16) != 0
    }

    /// Whether the syncpoint increments
    pub fn increment(self) -> bool {
        self.0 & (1 << 20) != 0
    }
}

/// Render target tile mode register
#[derive(Debug, Clone, Copy)]
pub struct TileMode(pub u32);

impl TileMode {
    /// Log2 of the block width in GOBs
    pub fn block_width_log2(self) -> u8 {
        (self.0 & 0xF) as u8
    }

    /// Log2 of the block height in GOBs
    pub fn block_height_log2(self) -> u8 {
        ((self.0 >> 4) & 0xF) as u8
    }

    /// Log2 of the block depth in GOBs
    pub fn block_depth_log2(self) -> u8 {
        ((self.0 >> 8) & 0xF) as u8
    }

    /// Whether the surface is linear rather than block-swizzled
    pub fn is_linear(self) -> bool {
        self.0 & (1 << 12) != 0
    }

    /// Convert to the texture layer's tiling description
    pub fn to_tile_config(self) -> TileConfig {
        if self.is_linear() {
            TileConfig::Linear
        } else {
            TileConfig::Block {
                block_height: 1 << self.block_height_log2(),
                block_depth: 1 << self.block_depth_log2(),
            }
        }
    }
}

/// Render target array mode register
#[derive(Debug, Clone, Copy)]
pub struct ArrayMode(pub u32);

impl ArrayMode {
    /// Number of array layers
    pub fn layer_count(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Whether the layers form a volume rather than an array
    pub fn volume(self) -> bool {
        self.0 & (1 << 16) != 0
    }
}

/// Render target control register: draw-buffer to slot mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTargetControl(pub u32);

impl RenderTargetControl {
    /// Number of active render targets
    pub fn count(self) -> usize {
        (self.0 & 0xF) as usize
    }

    /// Map a draw-buffer index to a render target slot
    pub fn map(self, index: usize) -> usize {
        ((self.0 >> (4 + 3 * index)) & 0b111) as usize
    }
}

/// Scissor bounds register: one axis's minimum/maximum pair
#[derive(Debug, Clone, Copy)]
pub struct ScissorBounds(pub u32);

impl ScissorBounds {
    /// Pack a bounds pair (used by tests and frontends)
    pub fn new(minimum: u16, maximum: u16) -> Self {
        Self((u32::from(maximum) << 16) | u32::from(minimum))
    }

    /// Lower bound of the masked region
    pub fn minimum(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Upper bound of the masked region
    pub fn maximum(self) -> u16 {
        (self.0 >> 16) as u16
    }
}

/// Buffer clear trigger register
#[derive(Debug, Clone, Copy)]
pub struct ClearBuffers(pub u32);

impl ClearBuffers {
    /// Clear the depth aspect
    pub fn depth(self) -> bool {
        self.0 & (1 << 0) != 0
    }

    /// Clear the stencil aspect
    pub fn stencil(self) -> bool {
        self.0 & (1 << 1) != 0
    }

    /// Clear the red channel
    pub fn red(self) -> bool {
        self.0 & (1 << 2) != 0
    }

    /// Clear the green channel
    pub fn green(self) -> bool {
        self.0 & (1 << 3) != 0
    }

    /// Clear the blue channel
    pub fn blue(self) -> bool {
        self.0 & (1 << 4) != 0
    }

    /// Clear the alpha channel
    pub fn alpha(self) -> bool {
        self.0 & (1 << 5) != 0
    }

    /// Draw-buffer index of the target to clear
    pub fn render_target_id(self) -> u8 {
        ((self.0 >> 6) & 0xF) as u8
    }

    /// Array layer to clear
    pub fn layer_id(self) -> u16 {
        ((self.0 >> 10) & 0x7FF) as u16
    }
}

/// Semaphore operation selected by the info register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreOp {
    /// Write the payload to the semaphore address
    Release,

    /// Block until the semaphore reaches a value
    Acquire,

    /// Write a counter value to the semaphore address
    Counter,

    /// Trap into the host
    Trap,
}

/// Semaphore result structure size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreStructureSize {
    /// 16-byte result: value and timestamp
    FourWords,

    /// 4-byte result: value only
    OneWord,
}

/// Semaphore info register
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreInfo(pub u32);

impl SemaphoreInfo {
    /// Operation to perform
    pub fn op(self) -> SemaphoreOp {
        match self.0 & 0b11 {
            0 => SemaphoreOp::Release,
            1 => SemaphoreOp::Acquire,
            2 => SemaphoreOp::Counter,
            _ => SemaphoreOp::Trap,
        }
    }

    /// Raw counter type for counter operations
    ///
    /// Only the zero counter (0x0) is recognized by the core.
    pub fn counter_type(self) -> u8 {
        ((self.0 >> 23) & 0x1F) as u8
    }

    /// Result structure size
    pub fn structure_size(self) -> SemaphoreStructureSize {
        if self.0 & (1 << 28) != 0 {
            SemaphoreStructureSize::OneWord
        } else {
            SemaphoreStructureSize::FourWords
        }
    }
}

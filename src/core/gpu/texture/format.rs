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

//! Texture formats
//!
//! Format metadata is expressed in blocks rather than pixels so compressed
//! formats (where bytes-per-pixel is not a whole number) fit the same model.
//! For the uncompressed formats currently supported a block is one pixel.

use crate::core::error::{EmulatorError, Result};

use super::Dimensions;

/// Per-format layout metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Bytes per block (bytes per pixel for uncompressed formats)
    pub bytes_per_block: u32,

    /// Width of a block in pixels
    pub block_width: u32,

    /// Height of a block in pixels
    pub block_height: u32,
}

/// A texture format supported by the core
///
/// The set mirrors the render-target color formats the command processor can
/// translate; everything else is rejected as unsupported at the register
/// write that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// 8 bits per channel, 4 channels
    R8G8B8A8Unorm,

    /// 5-bit red, 6-bit green, 5-bit blue
    R5G6B5Unorm,
}

impl Format {
    /// Layout metadata for this format
    pub const fn info(self) -> FormatInfo {
        match self {
            Format::R8G8B8A8Unorm => FormatInfo {
                bytes_per_block: 4,
                block_width: 1,
                block_height: 1,
            },
            Format::R5G6B5Unorm => FormatInfo {
                bytes_per_block: 2,
                block_width: 1,
                block_height: 1,
            },
        }
    }

    /// Size in bytes of a tightly packed image of `dimensions` in this format
    pub fn size(self, dimensions: Dimensions) -> u64 {
        let info = self.info();
        let width_blocks = (dimensions.width / info.block_width) as u64;
        let height_blocks = (dimensions.height / info.block_height) as u64;
        width_blocks * height_blocks * info.bytes_per_block as u64 * dimensions.depth as u64
    }

    /// Whether `other` shares this format's texel layout
    ///
    /// Formats of equal bytes-per-block and block dimensions can reinterpret
    /// one another's backing without copying.
    pub fn is_compatible(self, other: Format) -> bool {
        let (a, b) = (self.info(), other.info());
        a.bytes_per_block == b.bytes_per_block
            && a.block_width == b.block_width
            && a.block_height == b.block_height
    }

    /// Decode a guest render-target color format register value
    ///
    /// `Ok(None)` means the slot was explicitly unbound (format `None`).
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnsupportedRenderTargetFormat`] for any value
    /// the core cannot translate.
    pub fn from_render_target_format(raw: u32) -> Result<Option<Format>> {
        match raw {
            0x00 => Ok(None),
            0xD5 => Ok(Some(Format::R8G8B8A8Unorm)),
            0xE8 => Ok(Some(Format::R5G6B5Unorm)),
            _ => Err(EmulatorError::UnsupportedRenderTargetFormat { raw }),
        }
    }
}

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

//! Guest surface memory layouts
//!
//! The GM20B stores surfaces in one of three arrangements: linear, pitch
//! linear (rows padded to a pitch), or block linear. Block linear groups
//! texel bytes into 64-byte × 8-line GOBs, stacks `block_height` GOBs into a
//! block, and swizzles 16-byte sectors within each GOB along a Morton curve
//! for spatial locality. Refer to Chapter 20.1 of the Tegra X1 TRM.
//!
//! This module converts between a guest arrangement and a tightly packed
//! row-major buffer, in both directions.

use super::format::FormatInfo;
use super::{Dimensions, TileConfig};

/// Width of a swizzled sector in bytes
const SECTOR_WIDTH: usize = 16;

/// Height of a swizzled sector in lines
const SECTOR_HEIGHT: usize = 2;

/// Width of a GOB in bytes
const GOB_WIDTH: usize = 64;

/// Height of a GOB in lines
const GOB_HEIGHT: usize = 8;

/// Swizzled 16-byte sector fragments in one GOB
const SECTORS_PER_GOB: usize = SECTOR_WIDTH * SECTOR_HEIGHT;

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Block-linear surface geometry derived from dimensions and format
struct Geometry {
    /// Bytes in one tightly packed row of blocks
    row_bytes: usize,

    /// Surface height in lines (rows of format blocks)
    surface_height: usize,

    /// Width of a ROB (row of blocks) in bytes, GOB-aligned
    rob_width_bytes: usize,

    /// Width of a ROB in GOBs
    rob_width_gobs: usize,

    /// Height of a ROB in lines
    rob_height: usize,

    /// Surface height in ROBs, padded up
    surface_height_robs: usize,
}

impl Geometry {
    fn new(dimensions: Dimensions, format: FormatInfo, block_height: u8) -> Self {
        let row_bytes =
            (dimensions.width / format.block_width) as usize * format.bytes_per_block as usize;
        let surface_height = (dimensions.height / format.block_height) as usize;
        let rob_width_bytes = align_up(row_bytes, GOB_WIDTH);
        let rob_height = GOB_HEIGHT * block_height as usize;
        Self {
            row_bytes,
            surface_height,
            rob_width_bytes,
            rob_width_gobs: rob_width_bytes / GOB_WIDTH,
            rob_height,
            surface_height_robs: align_up(surface_height.max(1), rob_height) / rob_height,
        }
    }
}

/// Size in bytes a surface occupies in guest memory under `tile_config`
pub fn guest_surface_size(
    dimensions: Dimensions,
    format: FormatInfo,
    tile_config: &TileConfig,
) -> u64 {
    let row_bytes =
        (dimensions.width / format.block_width) as u64 * format.bytes_per_block as u64;
    let surface_height = (dimensions.height / format.block_height) as u64;
    match tile_config {
        TileConfig::Linear => row_bytes * surface_height * dimensions.depth as u64,
        TileConfig::Pitch { pitch } => *pitch as u64 * surface_height,
        TileConfig::Block { block_height, .. } => {
            let geometry = Geometry::new(dimensions, format, *block_height);
            (geometry.surface_height_robs * geometry.rob_width_bytes * geometry.rob_height) as u64
        }
    }
}

/// Morton-swizzled X offset of a sector within its GOB, in bytes
fn sector_x(index: usize) -> usize {
    ((index << 3) & 0b10000) | ((index << 1) & 0b100000)
}

/// Morton-swizzled Y offset of a sector within its GOB, in lines
fn sector_y(index: usize) -> usize {
    ((index >> 1) & 0b110) | (index & 0b1)
}

/// Walk every sector of a block-linear surface in guest order
///
/// `copy` receives (guest offset, linear offset, byte count) for each sector
/// fragment that lands inside the packed linear buffer; sectors that fall
/// entirely in alignment padding advance the guest offset without a copy.
fn for_each_sector(geometry: &Geometry, block_height: usize, mut copy: impl FnMut(usize, usize, usize)) {
    let mut guest_offset = 0;
    for rob in 0..geometry.surface_height_robs {
        for gob_x in 0..geometry.rob_width_gobs {
            for gob_y in 0..block_height {
                let gob_line = rob * geometry.rob_height + gob_y * GOB_HEIGHT;
                let gob_byte = gob_x * GOB_WIDTH;
                for sector in 0..SECTORS_PER_GOB {
                    let line = gob_line + sector_y(sector);
                    let byte = gob_byte + sector_x(sector);
                    if line < geometry.surface_height && byte < geometry.row_bytes {
                        let count = SECTOR_WIDTH.min(geometry.row_bytes - byte);
                        copy(guest_offset, line * geometry.row_bytes + byte, count);
                    }
                    guest_offset += SECTOR_WIDTH;
                }
            }
        }
    }
}

/// Unswizzle a block-linear guest surface into a packed row-major buffer
pub fn block_linear_to_packed(
    guest: &[u8],
    packed: &mut [u8],
    dimensions: Dimensions,
    format: FormatInfo,
    block_height: u8,
) {
    let geometry = Geometry::new(dimensions, format, block_height);
    for_each_sector(&geometry, block_height as usize, |guest_offset, packed_offset, count| {
        packed[packed_offset..packed_offset + count]
            .copy_from_slice(&guest[guest_offset..guest_offset + count]);
    });
}

/// Swizzle a packed row-major buffer into a block-linear guest surface
pub fn packed_to_block_linear(
    packed: &[u8],
    guest: &mut [u8],
    dimensions: Dimensions,
    format: FormatInfo,
    block_height: u8,
) {
    let geometry = Geometry::new(dimensions, format, block_height);
    for_each_sector(&geometry, block_height as usize, |guest_offset, packed_offset, count| {
        guest[guest_offset..guest_offset + count]
            .copy_from_slice(&packed[packed_offset..packed_offset + count]);
    });
}

/// Copy a pitch-linear guest surface into a packed row-major buffer
pub fn pitch_to_packed(
    guest: &[u8],
    packed: &mut [u8],
    dimensions: Dimensions,
    format: FormatInfo,
    pitch: u32,
) {
    let row_bytes = (dimensions.width / format.block_width) as usize * format.bytes_per_block as usize;
    let surface_height = (dimensions.height / format.block_height) as usize;
    for line in 0..surface_height {
        let guest_offset = line * pitch as usize;
        let packed_offset = line * row_bytes;
        packed[packed_offset..packed_offset + row_bytes]
            .copy_from_slice(&guest[guest_offset..guest_offset + row_bytes]);
    }
}

/// Copy a packed row-major buffer into a pitch-linear guest surface
pub fn packed_to_pitch(
    packed: &[u8],
    guest: &mut [u8],
    dimensions: Dimensions,
    format: FormatInfo,
    pitch: u32,
) {
    let row_bytes = (dimensions.width / format.block_width) as usize * format.bytes_per_block as usize;
    let surface_height = (dimensions.height / format.block_height) as usize;
    for line in 0..surface_height {
        let guest_offset = line * pitch as usize;
        let packed_offset = line * row_bytes;
        guest[guest_offset..guest_offset + row_bytes]
            .copy_from_slice(&packed[packed_offset..packed_offset + row_bytes]);
    }
}

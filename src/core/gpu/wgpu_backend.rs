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

//! wgpu host backend
//!
//! Backs [`HostBackend`] images with `wgpu::Texture` objects. wgpu has no
//! 16-bit 5-6-5 texture format, so R5G6B5 surfaces are stored as RGBA8 and
//! widened on upload and narrowed again on download.
//!
//! wgpu tracks image layouts internally, so layout transitions are recorded
//! for the core's bookkeeping but need no host work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::error::{EmulatorError, Result};

use super::host::{
    HostBackend, ImageCreateInfo, ImageHandle, ImageLayout, SubresourceRange,
};
use super::texture::format::Format;
use super::texture::Dimensions;

struct WgpuImage {
    texture: wgpu::Texture,
    format: Format,
    dimensions: Dimensions,
    layer_count: u32,
}

/// [`HostBackend`] implementation over a wgpu device
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    images: Mutex<HashMap<u64, WgpuImage>>,
    next_id: AtomicU64,
}

impl WgpuBackend {
    /// Wrap an existing device and queue
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            images: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a backend on the first available adapter, without a surface
    ///
    /// Returns `None` when no adapter or device can be acquired (headless CI
    /// machines, typically).
    pub fn new_headless() -> Option<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok()?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("nsrx device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            experimental_features: Default::default(),
            trace: wgpu::Trace::Off,
        }))
        .ok()?;

        Some(Self::new(device, queue))
    }

    fn with_image<T>(&self, image: ImageHandle, f: impl FnOnce(&WgpuImage) -> T) -> Option<T> {
        self.images.lock().get(&image.0).map(f)
    }
}

/// All guest formats are stored as RGBA8 on the host
fn host_format(_format: Format) -> wgpu::TextureFormat {
    wgpu::TextureFormat::Rgba8Unorm
}

/// Host-side bytes per texel (after any widening conversion)
const HOST_BYTES_PER_TEXEL: u32 = 4;

/// Widen packed guest texels to RGBA8
fn texels_to_host(format: Format, data: &[u8]) -> Vec<u8> {
    match format {
        Format::R8G8B8A8Unorm => data.to_vec(),
        Format::R5G6B5Unorm => {
            let mut out = Vec::with_capacity(data.len() * 2);
            for texel in data.chunks_exact(2) {
                let packed = u16::from_le_bytes([texel[0], texel[1]]);
                let r = ((packed >> 11) & 0x1F) as u8;
                let g = ((packed >> 5) & 0x3F) as u8;
                let b = (packed & 0x1F) as u8;
                out.push((r << 3) | (r >> 2));
                out.push((g << 2) | (g >> 4));
                out.push((b << 3) | (b >> 2));
                out.push(0xFF);
            }
            out
        }
    }
}

/// Narrow RGBA8 host texels back to the packed guest format
fn texels_from_host(format: Format, data: &[u8]) -> Vec<u8> {
    match format {
        Format::R8G8B8A8Unorm => data.to_vec(),
        Format::R5G6B5Unorm => {
            let mut out = Vec::with_capacity(data.len() / 2);
            for texel in data.chunks_exact(4) {
                let packed = (((texel[0] >> 3) as u16) << 11)
                    | (((texel[1] >> 2) as u16) << 5)
                    | ((texel[2] >> 3) as u16);
                out.extend_from_slice(&packed.to_le_bytes());
            }
            out
        }
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl HostBackend for WgpuBackend {
    fn create_image(&self, info: &ImageCreateInfo) -> Result<ImageHandle> {
        let layer_count = info.layer_count.max(1);
        let (dimension, depth_or_array_layers) = if info.dimensions.depth > 1 {
            (wgpu::TextureDimension::D3, info.dimensions.depth)
        } else {
            (wgpu::TextureDimension::D2, layer_count)
        };

        if info.dimensions.width == 0 || info.dimensions.height == 0 {
            return Err(EmulatorError::ImageCreation {
                reason: format!("degenerate extent {:?}", info.dimensions),
            });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("nsrx guest surface"),
            size: wgpu::Extent3d {
                width: info.dimensions.width,
                height: info.dimensions.height,
                depth_or_array_layers,
            },
            mip_level_count: info.mip_levels.max(1),
            sample_count: info.sample_count.max(1),
            dimension,
            format: host_format(info.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.images.lock().insert(
            id,
            WgpuImage {
                texture,
                format: info.format,
                dimensions: info.dimensions,
                layer_count,
            },
        );
        Ok(ImageHandle(id))
    }

    fn destroy_image(&self, image: ImageHandle) {
        if let Some(image) = self.images.lock().remove(&image.0) {
            image.texture.destroy();
        }
    }

    fn transition_image(&self, _image: ImageHandle, from: ImageLayout, to: ImageLayout) {
        // wgpu manages layouts itself
        log::trace!("layout transition {:?} -> {:?}", from, to);
    }

    fn clear_color_image(&self, image: ImageHandle, value: [u32; 4], range: &SubresourceRange) {
        self.with_image(image, |image| {
            let texel: [u8; 4] = match image.format {
                Format::R8G8B8A8Unorm => [
                    value[0] as u8,
                    value[1] as u8,
                    value[2] as u8,
                    value[3] as u8,
                ],
                Format::R5G6B5Unorm => {
                    let r = (value[0] & 0x1F) as u8;
                    let g = (value[1] & 0x3F) as u8;
                    let b = (value[2] & 0x1F) as u8;
                    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 0xFF]
                }
            };

            let width = image.dimensions.width;
            let height = image.dimensions.height;
            let base = range.base_array_layer.min(image.layer_count);
            let layers = range
                .array_layers(image.layer_count)
                .min(image.layer_count - base);
            if layers == 0 {
                return;
            }

            let mut data =
                Vec::with_capacity((width * height * HOST_BYTES_PER_TEXEL * layers) as usize);
            for _ in 0..width * height * layers {
                data.extend_from_slice(&texel);
            }

            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &image.texture,
                    mip_level: range.base_mip_level,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: base,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * HOST_BYTES_PER_TEXEL),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: layers,
                },
            );
        });
    }

    fn copy_image(&self, source: ImageHandle, destination: ImageHandle, range: &SubresourceRange) {
        let images = self.images.lock();
        let (Some(source_image), Some(destination_image)) =
            (images.get(&source.0), images.get(&destination.0))
        else {
            return;
        };

        let layers = range.array_layers(source_image.layer_count);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nsrx image copy"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &source_image.texture,
                mip_level: range.base_mip_level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: range.base_array_layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &destination_image.texture,
                mip_level: range.base_mip_level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: range.base_array_layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: source_image.dimensions.width,
                height: source_image.dimensions.height,
                depth_or_array_layers: layers.max(1),
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn upload_image(&self, image: ImageHandle, data: &[u8]) -> Result<()> {
        self.with_image(image, |image| {
            let host_texels = texels_to_host(image.format, data);
            let width = image.dimensions.width;
            let rows = (host_texels.len() as u32 / (width * HOST_BYTES_PER_TEXEL)).max(1);

            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &image.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &host_texels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * HOST_BYTES_PER_TEXEL),
                    rows_per_image: Some(rows),
                },
                wgpu::Extent3d {
                    width,
                    height: rows.min(image.dimensions.height),
                    depth_or_array_layers: 1,
                },
            );
        });
        Ok(())
    }

    fn download_image(&self, image: ImageHandle, buffer: &mut [u8]) -> Result<()> {
        let (texture, format, width, height) = match self.with_image(image, |image| {
            (
                image.texture.clone(),
                image.format,
                image.dimensions.width,
                image.dimensions.height,
            )
        }) {
            Some(entry) => entry,
            None => return Ok(()),
        };

        let packed_bytes_per_row = width * HOST_BYTES_PER_TEXEL;
        let padded_bytes_per_row =
            align_up(packed_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nsrx readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nsrx readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        let mapped = slice.get_mapped_range();
        let mut host_texels = vec![0u8; (packed_bytes_per_row * height) as usize];
        for row in 0..height as usize {
            let source = row * padded_bytes_per_row as usize;
            let destination = row * packed_bytes_per_row as usize;
            host_texels[destination..destination + packed_bytes_per_row as usize]
                .copy_from_slice(&mapped[source..source + packed_bytes_per_row as usize]);
        }
        drop(mapped);
        staging.unmap();

        let guest_texels = texels_from_host(format, &host_texels);
        let count = buffer.len().min(guest_texels.len());
        buffer[..count].copy_from_slice(&guest_texels[..count]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_565_widening_round_trip() {
        // Pure red, mid green, pure blue
        let packed: u16 = 0xF800 | (0x20 << 5) | 0x1F;
        let guest = packed.to_le_bytes();
        let host = texels_to_host(Format::R5G6B5Unorm, &guest);
        assert_eq!(host[0], 0xFF);
        assert_eq!(host[2], 0xFF);
        assert_eq!(host[3], 0xFF);

        let back = texels_from_host(Format::R5G6B5Unorm, &host);
        assert_eq!(u16::from_le_bytes([back[0], back[1]]), packed);
    }

    #[test]
    fn test_rgba8_texels_pass_through() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(texels_to_host(Format::R8G8B8A8Unorm, &data), data);
        assert_eq!(texels_from_host(Format::R8G8B8A8Unorm, &data), data);
    }
}

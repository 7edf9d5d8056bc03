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

//! CPU-only host backend
//!
//! Keeps every image as a plain byte buffer. Useful on hosts without a GPU
//! and as the backend under test: image contents are directly observable and
//! operation counts are tracked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::core::error::Result;

use super::host::{
    HostBackend, ImageCreateInfo, ImageHandle, ImageLayout, SubresourceRange,
};
use super::texture::format::Format;

struct SoftwareImage {
    format: Format,
    layer_size: usize,
    layer_count: u32,
    data: Vec<u8>,
}

/// In-memory implementation of [`HostBackend`]
pub struct SoftwareBackend {
    images: Mutex<HashMap<u64, SoftwareImage>>,
    next_id: AtomicU64,
    transitions: AtomicUsize,
    clears: AtomicUsize,
    copies: AtomicUsize,
}

impl SoftwareBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            transitions: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            copies: AtomicUsize::new(0),
        }
    }

    /// Snapshot of an image's bytes, mip 0 across all layers
    pub fn image_data(&self, image: ImageHandle) -> Option<Vec<u8>> {
        self.images.lock().get(&image.0).map(|image| image.data.clone())
    }

    /// Number of live images
    pub fn image_count(&self) -> usize {
        self.images.lock().len()
    }

    /// Number of layout transitions issued
    pub fn transition_count(&self) -> usize {
        self.transitions.load(Ordering::SeqCst)
    }

    /// Number of clears issued
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Number of image copies issued
    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// One texel of `format` filled from a clear value
fn clear_texel(format: Format, value: [u32; 4]) -> Vec<u8> {
    match format {
        Format::R8G8B8A8Unorm => vec![
            value[0] as u8,
            value[1] as u8,
            value[2] as u8,
            value[3] as u8,
        ],
        Format::R5G6B5Unorm => {
            let packed = ((value[0] as u16 & 0x1F) << 11)
                | ((value[1] as u16 & 0x3F) << 5)
                | (value[2] as u16 & 0x1F);
            packed.to_le_bytes().to_vec()
        }
    }
}

impl HostBackend for SoftwareBackend {
    fn create_image(&self, info: &ImageCreateInfo) -> Result<ImageHandle> {
        let layer_size = info.format.size(info.dimensions) as usize;
        let layer_count = info.layer_count.max(1);
        let image = SoftwareImage {
            format: info.format,
            layer_size,
            layer_count,
            data: vec![0; layer_size * layer_count as usize],
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.images.lock().insert(id, image);
        Ok(ImageHandle(id))
    }

    fn destroy_image(&self, image: ImageHandle) {
        if self.images.lock().remove(&image.0).is_none() {
            log::warn!("destroying unknown image handle {:?}", image);
        }
    }

    fn transition_image(&self, _image: ImageHandle, from: ImageLayout, to: ImageLayout) {
        log::trace!("image transition {:?} -> {:?}", from, to);
        self.transitions.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_color_image(&self, image: ImageHandle, value: [u32; 4], range: &SubresourceRange) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        let mut images = self.images.lock();
        let Some(image) = images.get_mut(&image.0) else {
            return;
        };

        let texel = clear_texel(image.format, value);
        let base = range.base_array_layer.min(image.layer_count);
        let count = range.array_layers(image.layer_count).min(image.layer_count - base);
        for layer in base..base + count {
            let offset = layer as usize * image.layer_size;
            for chunk in image.data[offset..offset + image.layer_size].chunks_mut(texel.len()) {
                chunk.copy_from_slice(&texel[..chunk.len()]);
            }
        }
    }

    fn copy_image(&self, source: ImageHandle, destination: ImageHandle, range: &SubresourceRange) {
        self.copies.fetch_add(1, Ordering::SeqCst);
        let mut images = self.images.lock();
        let Some(source_image) = images.get(&source.0) else {
            return;
        };
        let source_data = source_image.data.clone();
        let source_layer_size = source_image.layer_size;
        let source_layers = source_image.layer_count;

        let Some(destination_image) = images.get_mut(&destination.0) else {
            return;
        };

        let base = range.base_array_layer;
        let count = range
            .array_layers(source_layers)
            .min(destination_image.layer_count.saturating_sub(base));
        for layer in base..base + count {
            let offset = layer as usize * source_layer_size;
            let len = source_layer_size.min(destination_image.layer_size);
            if offset + len > source_data.len()
                || offset + len > destination_image.data.len()
            {
                break;
            }
            destination_image.data[offset..offset + len]
                .copy_from_slice(&source_data[offset..offset + len]);
        }
    }

    fn upload_image(&self, image: ImageHandle, data: &[u8]) -> Result<()> {
        let mut images = self.images.lock();
        if let Some(image) = images.get_mut(&image.0) {
            let count = data.len().min(image.layer_size);
            image.data[..count].copy_from_slice(&data[..count]);
        }
        Ok(())
    }

    fn download_image(&self, image: ImageHandle, buffer: &mut [u8]) -> Result<()> {
        let images = self.images.lock();
        if let Some(image) = images.get(&image.0) {
            let count = buffer.len().min(image.layer_size);
            buffer[..count].copy_from_slice(&image.data[..count]);
        }
        Ok(())
    }
}

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

//! Texture cache
//!
//! Maintains the global mapping from guest surface bytes to host textures:
//! lookups of existing textures for a guest descriptor, creation when none
//! match, and reconciliation when a descriptor overlaps textures it is not
//! compatible with.
//!
//! One coarse lock protects the entry collection (identity); content
//! mutation on an individual texture is covered by that texture's own lock.
//! The collection is kept sorted by host address, one entry per mapped range,
//! and never holds two live entries covering the same byte under different
//! textures.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::error::{EmulatorError, Result};
use crate::core::memory::{AddressTranslator, HostRange};

use super::host::{HostBackend, SubresourceRange};
use super::texture::{ComponentMapping, GuestTexture, Texture, TextureView};

/// One mapped range of a cached texture
struct CacheEntry {
    /// The host byte range this entry covers
    range: HostRange,

    /// Owning texture
    texture: Arc<Texture>,

    /// Index of this range in the owning texture's guest mapping list
    ///
    /// An index rather than anything tied to the mapping storage, so it
    /// survives reallocation of the mapping vector.
    mapping_index: usize,
}

/// Deduplicating owner of host textures for guest surfaces
pub struct TextureCache {
    backend: Arc<dyn HostBackend>,
    translator: Arc<dyn AddressTranslator>,
    entries: Mutex<Vec<CacheEntry>>,
}

impl TextureCache {
    /// Create an empty cache
    pub fn new(backend: Arc<dyn HostBackend>, translator: Arc<dyn AddressTranslator>) -> Self {
        Self {
            backend,
            translator,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Number of live entries (one per mapped range)
    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Find a texture matching `descriptor` or create one
    ///
    /// A cached texture is reused when the descriptor starts where the
    /// texture starts and its dimensions and tiling configuration match the
    /// descriptor's exactly; the view is produced under the descriptor's own
    /// format, so texel-layout-compatible format differences reinterpret
    /// rather than duplicate. Overlapping textures that do not match are
    /// evicted whole before a replacement texture is created.
    ///
    /// # Errors
    ///
    /// The descriptor must carry a format and at least one mapped range;
    /// host image creation failures propagate.
    pub fn find_or_create(&self, descriptor: &GuestTexture) -> Result<Arc<TextureView>> {
        let format = descriptor.format.ok_or(EmulatorError::UnspecifiedFormat)?;
        if descriptor.mappings.is_empty() {
            return Err(EmulatorError::UnmappedDescriptor);
        }

        let mut entries = self.entries.lock();

        if let Some(texture) = self.find_match(&entries, descriptor) {
            log::trace!("texture cache hit for {:?}", descriptor.mappings[0]);
            return Ok(self.view_for(&texture, descriptor, format));
        }

        self.evict_overlaps(&mut entries, descriptor);

        let texture = Arc::new(Texture::from_guest(
            Arc::clone(&self.backend),
            Arc::clone(&self.translator),
            descriptor.clone(),
        )?);
        {
            let mut guard = texture.lock();
            texture.synchronize_host(&mut guard)?;
        }

        for (mapping_index, range) in descriptor.mappings.iter().enumerate() {
            let position =
                entries.partition_point(|entry| entry.range.address < range.address);
            entries.insert(
                position,
                CacheEntry {
                    range: *range,
                    texture: Arc::clone(&texture),
                    mapping_index,
                },
            );
        }

        Ok(self.view_for(&texture, descriptor, format))
    }

    /// Search the sorted entries for a reusable texture
    ///
    /// The descriptor's first mapping must line up with the start of the
    /// candidate (its mapping slot 0); a descriptor starting mid-texture
    /// describes a different surface even when the shapes agree.
    fn find_match(&self, entries: &[CacheEntry], descriptor: &GuestTexture) -> Option<Arc<Texture>> {
        let first = descriptor.mappings.first()?;
        for entry in Self::overlapping(entries, first) {
            if entry.mapping_index != 0 || entry.range.address != first.address {
                continue;
            }
            let candidate = &entry.texture;
            let guest_tile = {
                let guard = candidate.lock();
                guard.guest().map(|guest| guest.tile_config)
            };
            if candidate.dimensions() == descriptor.dimensions
                && guest_tile == Some(descriptor.tile_config)
            {
                return Some(Arc::clone(candidate));
            }
        }
        None
    }

    /// Remove every entry belonging to a texture that overlaps the descriptor
    ///
    /// Reconciliation granularity is the whole texture: a partial overlap
    /// with an incompatible texture drops all of that texture's entries, not
    /// just the intersecting ones.
    fn evict_overlaps(&self, entries: &mut Vec<CacheEntry>, descriptor: &GuestTexture) {
        let mut evicted: Vec<Arc<Texture>> = Vec::new();
        for range in &descriptor.mappings {
            for entry in Self::overlapping(entries, range) {
                if !evicted
                    .iter()
                    .any(|texture| Arc::ptr_eq(texture, &entry.texture))
                {
                    evicted.push(Arc::clone(&entry.texture));
                }
            }
        }

        if !evicted.is_empty() {
            log::debug!(
                "evicting {} overlapping texture(s) from the cache",
                evicted.len()
            );
            entries.retain(|entry| {
                !evicted
                    .iter()
                    .any(|texture| Arc::ptr_eq(texture, &entry.texture))
            });
        }
    }

    /// Entries whose range intersects `range`
    ///
    /// Entries are sorted by address and non-overlapping, so the candidates
    /// form one contiguous run; walk from the first entry that ends past the
    /// range start.
    fn overlapping<'a>(
        entries: &'a [CacheEntry],
        range: &'a HostRange,
    ) -> impl Iterator<Item = &'a CacheEntry> {
        let start = entries.partition_point(|entry| entry.range.end() <= range.address);
        entries[start..]
            .iter()
            .take_while(move |entry| entry.range.address < range.end())
    }

    fn view_for(
        &self,
        texture: &Arc<Texture>,
        descriptor: &GuestTexture,
        format: super::texture::format::Format,
    ) -> Arc<TextureView> {
        texture.view(
            Some(format),
            descriptor.kind,
            SubresourceRange {
                base_mip_level: 0,
                mip_level_count: None,
                base_array_layer: descriptor.base_layer as u32,
                array_layer_count: Some(descriptor.layer_count.max(1) as u32),
            },
            ComponentMapping::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::software::SoftwareBackend;
    use crate::core::gpu::texture::format::Format;
    use crate::core::gpu::texture::{Dimensions, TextureKind, TileConfig};
    use crate::core::memory::FlatTranslator;

    fn cache() -> TextureCache {
        TextureCache::new(
            Arc::new(SoftwareBackend::new()),
            Arc::new(FlatTranslator::new(0x100000)),
        )
    }

    fn descriptor(address: u64, width: u32, height: u32) -> GuestTexture {
        GuestTexture {
            mappings: vec![HostRange {
                address,
                size: (width * height * 4) as u64,
            }],
            dimensions: Dimensions::new(width, height, 1),
            format: Some(Format::R8G8B8A8Unorm),
            tile_config: TileConfig::Linear,
            kind: TextureKind::D2,
            base_layer: 0,
            layer_count: 1,
            layer_stride: 0,
        }
    }

    #[test]
    fn test_identical_descriptors_share_a_texture() {
        let cache = cache();
        let first = cache.find_or_create(&descriptor(0x1000, 16, 16)).unwrap();
        let second = cache.find_or_create(&descriptor(0x1000, 16, 16)).unwrap();

        assert!(Arc::ptr_eq(&first.texture, &second.texture));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_compatible_format_reinterprets_instead_of_duplicating() {
        let cache = cache();
        let first = cache.find_or_create(&descriptor(0x1000, 16, 16)).unwrap();

        let mut reinterpreted = descriptor(0x1000, 16, 16);
        reinterpreted.format = Some(Format::R5G6B5Unorm);
        reinterpreted.mappings[0].size = 16 * 16 * 2;
        let second = cache.find_or_create(&reinterpreted).unwrap();

        assert!(Arc::ptr_eq(&first.texture, &second.texture));
        assert_eq!(second.format, Format::R5G6B5Unorm);
    }

    #[test]
    fn test_disjoint_descriptors_create_distinct_textures() {
        let cache = cache();
        let first = cache.find_or_create(&descriptor(0x1000, 16, 16)).unwrap();
        let second = cache.find_or_create(&descriptor(0x8000, 16, 16)).unwrap();

        assert!(!Arc::ptr_eq(&first.texture, &second.texture));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn test_incompatible_overlap_evicts_old_texture() {
        let cache = cache();
        let first = cache.find_or_create(&descriptor(0x1000, 16, 16)).unwrap();

        // Same bytes, different dimensions: the old texture must be evicted
        let second = cache.find_or_create(&descriptor(0x1000, 32, 8)).unwrap();

        assert!(!Arc::ptr_eq(&first.texture, &second.texture));
        assert_eq!(cache.entry_count(), 1);

        // A third lookup with the new shape reuses the replacement
        let third = cache.find_or_create(&descriptor(0x1000, 32, 8)).unwrap();
        assert!(Arc::ptr_eq(&second.texture, &third.texture));
    }

    #[test]
    fn test_offset_overlap_is_not_reused() {
        let cache = cache();
        let first = cache.find_or_create(&descriptor(0x1000, 16, 16)).unwrap();

        // Same shape, but starting in the middle of the existing texture
        let second = cache.find_or_create(&descriptor(0x1200, 16, 16)).unwrap();

        assert!(!Arc::ptr_eq(&first.texture, &second.texture));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_multi_range_descriptor_inserts_sorted_entries() {
        let cache = TextureCache::new(
            Arc::new(SoftwareBackend::new()),
            Arc::new(FlatTranslator::new(0x100000)),
        );

        let mut split = descriptor(0, 16, 16);
        split.mappings = vec![
            HostRange {
                address: 0x4000,
                size: 512,
            },
            HostRange {
                address: 0x1000,
                size: 512,
            },
        ];
        cache.find_or_create(&split).unwrap();
        assert_eq!(cache.entry_count(), 2);

        let entries = cache.entries.lock();
        assert!(entries[0].range.address < entries[1].range.address);
        assert_eq!(entries[0].mapping_index, 1);
        assert_eq!(entries[1].mapping_index, 0);
    }

    #[test]
    fn test_descriptor_without_format_is_rejected() {
        let cache = cache();
        let mut missing = descriptor(0x1000, 4, 4);
        missing.format = None;
        assert_eq!(
            cache.find_or_create(&missing).unwrap_err(),
            EmulatorError::UnspecifiedFormat
        );
    }

    #[test]
    fn test_descriptor_without_mappings_is_rejected() {
        let cache = cache();
        let mut unmapped = descriptor(0x1000, 4, 4);
        unmapped.mappings.clear();
        assert_eq!(
            cache.find_or_create(&unmapped).unwrap_err(),
            EmulatorError::UnmappedDescriptor
        );
    }
}

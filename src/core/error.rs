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

//! Emulator error types
//!
//! All fallible operations in the core return [`Result<T>`], an alias for
//! `Result<T, EmulatorError>`. Fatal conditions abort processing of the
//! offending guest command; conditions the hardware tolerates (unrecognized
//! semaphore counter types, for example) are logged through the `log` facade
//! and never surface here.

use thiserror::Error;

use crate::core::gpu::texture::format::Format;

/// Errors that can occur during emulation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmulatorError {
    /// A render target was given a color format the core cannot translate
    #[error("unsupported render target format: 0x{raw:X}")]
    UnsupportedRenderTargetFormat {
        /// Raw guest register value
        raw: u32,
    },

    /// A render target was configured as a volume (3D array), which the
    /// host image model does not represent
    #[error("unsupported volumetric render target array (layer count = {layer_count})")]
    UnsupportedArrayVolume {
        /// Layer count carried by the offending array-mode write
        layer_count: u32,
    },

    /// A render target base layer exceeded the 16-bit layer index range
    #[error("render target base layer {base_layer} exceeds the 16-bit layer range")]
    BaseLayerOutOfRange {
        /// Requested base layer
        base_layer: u32,
    },

    /// The macro instruction RAM is full
    #[error("macro instruction RAM exhausted (capacity = {capacity} words)")]
    MacroCodeExhausted {
        /// Capacity of the instruction RAM in 32-bit words
        capacity: usize,
    },

    /// The macro start-address table is full
    #[error("macro start-address table exhausted (capacity = {capacity} entries)")]
    MacroTableExhausted {
        /// Number of start-address slots
        capacity: usize,
    },

    /// A macro attempted to invoke another macro while one was executing
    #[error("nested macro invocation is not supported")]
    NestedMacroInvocation,

    /// A texture was reinterpreted under a format with a different texel layout
    #[error("cannot reinterpret {from:?} backing as {to:?}: texel layouts differ")]
    IncompatibleFormat {
        /// Format currently applied to the backing
        from: Format,
        /// Requested replacement format
        to: Format,
    },

    /// The address translator could not resolve a guest range
    #[error("failed to translate guest range 0x{address:X} (+0x{size:X})")]
    AddressTranslation {
        /// Guest GPU virtual address
        address: u64,
        /// Length of the span in bytes
        size: u64,
    },

    /// The host backend failed to create an image
    #[error("host image creation failed: {reason}")]
    ImageCreation {
        /// Backend-specific failure description
        reason: String,
    },

    /// A texture operation required a guest descriptor that was never attached
    #[error("texture has no associated guest descriptor")]
    MissingGuestDescriptor,

    /// A descriptor reached the texture cache without a resolved format
    #[error("guest texture descriptor carries no format")]
    UnspecifiedFormat,

    /// A descriptor reached the texture cache without any mapped ranges
    #[error("guest texture descriptor carries no mapped ranges")]
    UnmappedDescriptor,

    /// A texture copy was requested from a backing with undefined layout
    #[error("cannot copy from an image with undefined layout")]
    CopyFromUndefinedLayout,

    /// A texture copy was requested between images of different dimensions
    #[error("cannot copy between images with different dimensions")]
    CopyDimensionsMismatch,

    /// A texture copy was requested between images of different formats
    #[error("cannot copy between images with different formats")]
    CopyFormatMismatch,
}

/// Result type alias for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmulatorError::UnsupportedRenderTargetFormat { raw: 0xC0 };
        assert_eq!(
            err.to_string(),
            "unsupported render target format: 0xC0"
        );

        let err = EmulatorError::AddressTranslation {
            address: 0x1000,
            size: 0x200,
        };
        assert_eq!(
            err.to_string(),
            "failed to translate guest range 0x1000 (+0x200)"
        );
    }

    #[test]
    fn test_macro_exhaustion_messages() {
        let err = EmulatorError::MacroCodeExhausted { capacity: 0x10000 };
        assert!(err.to_string().contains("65536"));

        let err = EmulatorError::MacroTableExhausted { capacity: 0x80 };
        assert!(err.to_string().contains("128"));
    }
}

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

//! Maxwell 3D command engine
//!
//! The register file and dispatch front end for the GM20B's 3D class. A
//! pushbuffer decoder upstream turns guest command buffers into
//! (method, argument, last-in-packet) triples and feeds them to
//! [`Maxwell3D::call_method`], the engine's sole entry point. Each call
//! updates the register file under the shadow-RAM policy, forwards state
//! changes to the [`GraphicsContext`], and runs any write-triggered action
//! the method carries (macro RAM loads, syncpoint increments, buffer clears,
//! semaphore releases).
//!
//! The engine runs on one logical thread and takes no locks of its own;
//! ordering is the program order of incoming calls.

pub mod macros;
pub mod registers;

use std::sync::Arc;

use crate::core::clock::{gpu_ticks_from_nanoseconds, MonotonicClock};
use crate::core::error::{EmulatorError, Result};
use crate::core::gfx::{GraphicsContext, VIEWPORT_COUNT};
use crate::core::gpu::texture::format::Format;
use crate::core::gpu::Gpu;

use macros::{MacroInterpreter, MacroInvocation, MacroStore, MACRO_POSITION_COUNT};
use registers::{
    offset, ArrayMode, ClearBuffers, RenderTargetControl, ScissorBounds, SemaphoreInfo,
    SemaphoreOp, SemaphoreStructureSize, ShadowRamControl, SyncpointAction, TileMode,
    REGISTER_COUNT,
};

/// The one synchronization-point operation this engine performs
///
/// The syncpoint engine itself lives outside this core.
pub trait SyncpointSet: Send + Sync {
    /// Increment syncpoint `id`
    fn increment(&self, id: u16);
}

/// Sixteen-byte semaphore result written for four-word releases
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SemaphoreResult {
    value: u64,
    timestamp: u64,
}

/// The Maxwell 3D engine's register file and dispatch front end
///
/// Owns the per-engine state the hardware keeps per channel: the live and
/// shadow register files, macro storage, and the graphics context translating
/// register state into host draw state. Lifecycle is bound to the owning GPU
/// channel; nothing here is process-global.
pub struct Maxwell3D {
    gpu: Arc<Gpu>,
    syncpoints: Arc<dyn SyncpointSet>,
    clock: Arc<dyn MonotonicClock>,

    registers: Box<[u32; REGISTER_COUNT]>,

    /// Shadow copy of the register file; meaningful only while the shadow
    /// control register selects tracking or replay
    shadow_registers: Box<[u32; REGISTER_COUNT]>,
    shadow_control: ShadowRamControl,

    macros: MacroStore,
    invocation: MacroInvocation,

    /// Taken while a macro executes so reentrant execution is detectable
    interpreter: Option<Box<dyn MacroInterpreter>>,

    context: GraphicsContext,
}

impl Maxwell3D {
    /// Create an engine over the shared GPU services
    ///
    /// Registers start from their power-on defaults, see
    /// [`reset_registers`](Maxwell3D::reset_registers).
    pub fn new(
        gpu: Arc<Gpu>,
        interpreter: Box<dyn MacroInterpreter>,
        syncpoints: Arc<dyn SyncpointSet>,
        clock: Arc<dyn MonotonicClock>,
    ) -> Self {
        let mut engine = Self {
            context: GraphicsContext::new(Arc::clone(&gpu)),
            gpu,
            syncpoints,
            clock,
            registers: Box::new([0; REGISTER_COUNT]),
            shadow_registers: Box::new([0; REGISTER_COUNT]),
            shadow_control: ShadowRamControl::default(),
            macros: MacroStore::new(),
            invocation: MacroInvocation::default(),
            interpreter: Some(interpreter),
        };
        engine.reset_registers();
        engine
    }

    /// Reset the register file to its power-on defaults
    pub fn reset_registers(&mut self) {
        self.registers.fill(0);

        self.registers[offset::RASTERIZER_ENABLE] = 1;
        self.registers[offset::VIEWPORT_TRANSFORM_ENABLE] = 1;

        for index in 0..VIEWPORT_COUNT {
            let slot = offset::VIEWPORT_BASE + index * offset::VIEWPORT_WORDS;
            self.registers[slot + offset::VIEWPORT_DEPTH_NEAR] = 0.0f32.to_bits();
            self.registers[slot + offset::VIEWPORT_DEPTH_FAR] = 1.0f32.to_bits();
        }
    }

    /// Current value of a register
    pub fn register(&self, method: usize) -> u32 {
        self.registers[method]
    }

    /// Shadow policy currently in force
    pub fn shadow_control(&self) -> ShadowRamControl {
        self.shadow_control
    }

    /// The graphics state driven by this engine
    pub fn graphics(&mut self) -> &mut GraphicsContext {
        &mut self.context
    }

    /// Uploaded macro storage
    pub fn macro_store(&self) -> &MacroStore {
        &self.macros
    }

    /// Process one decoded guest command
    ///
    /// `method` selects a register (below the register count) or macro
    /// control space (at or above it). `last_call` marks the final method of
    /// the pushbuffer entry, which is when an accumulated macro invocation
    /// executes.
    ///
    /// # Errors
    ///
    /// Fatal conditions (unsupported formats, macro store exhaustion) abort
    /// the command; tolerable unknowns are logged and ignored.
    pub fn call_method(&mut self, method: u32, argument: u32, last_call: bool) -> Result<()> {
        log::trace!("method 0x{:X} argument 0x{:X}", method, argument);

        if method as usize >= REGISTER_COUNT {
            return self.call_macro_method(method, argument, last_call);
        }
        let method = method as usize;

        // Shadow policy applies before the store: tracking copies the write
        // into shadow RAM, replay discards it in favor of the tracked value
        let argument = match self.shadow_control {
            ShadowRamControl::Track | ShadowRamControl::TrackWithFilter => {
                self.shadow_registers[method] = argument;
                argument
            }
            ShadowRamControl::Replay => self.shadow_registers[method],
            ShadowRamControl::Passthrough => argument,
        };

        let redundant = self.registers[method] == argument;
        self.registers[method] = argument;

        // Derived host state is only recomputed when the value changed;
        // write-triggered actions run regardless
        if !redundant {
            self.handle_value_change(method)?;
        }
        self.handle_side_effects(method, argument)
    }

    /// Accumulate a macro-space method, executing on the packet's last call
    fn call_macro_method(&mut self, method: u32, argument: u32, last_call: bool) -> Result<()> {
        if method % 2 == 0 {
            self.invocation
                .select(((method as usize - REGISTER_COUNT) >> 1) % MACRO_POSITION_COUNT);
        }
        self.invocation.push(argument);

        if !last_call {
            return Ok(());
        }

        let (index, arguments) = self.invocation.take();
        let start_offset = self.macros.position(index);

        let mut interpreter = self
            .interpreter
            .take()
            .ok_or(EmulatorError::NestedMacroInvocation)?;
        let result = interpreter.execute(self, start_offset, &arguments);
        self.interpreter = Some(interpreter);
        result
    }

    /// Forward a changed register value to the graphics context
    fn handle_value_change(&mut self, method: usize) -> Result<()> {
        let value = self.registers[method];
        match method {
            offset::RENDER_TARGET_BASE..=offset::RENDER_TARGET_LAST => {
                let index = (method - offset::RENDER_TARGET_BASE) / offset::RENDER_TARGET_WORDS;
                let word = (method - offset::RENDER_TARGET_BASE) % offset::RENDER_TARGET_WORDS;
                self.render_target_change(index, word, value)?;
            }

            offset::VIEWPORT_TRANSFORM_BASE..=offset::VIEWPORT_TRANSFORM_LAST => {
                let index =
                    (method - offset::VIEWPORT_TRANSFORM_BASE) / offset::VIEWPORT_TRANSFORM_WORDS;
                let word =
                    (method - offset::VIEWPORT_TRANSFORM_BASE) % offset::VIEWPORT_TRANSFORM_WORDS;
                self.viewport_transform_change(index, word);
            }

            offset::CLEAR_COLOR_BASE..=offset::CLEAR_COLOR_LAST => {
                self.context
                    .update_clear_color(method - offset::CLEAR_COLOR_BASE, value);
            }

            offset::SCISSOR_BASE..=offset::SCISSOR_LAST => {
                let index = (method - offset::SCISSOR_BASE) / offset::SCISSOR_WORDS;
                let word = (method - offset::SCISSOR_BASE) % offset::SCISSOR_WORDS;
                self.scissor_change(index, word, value);
            }

            offset::RENDER_TARGET_CONTROL => {
                self.context
                    .update_render_target_control(RenderTargetControl(value));
            }

            _ => {}
        }
        Ok(())
    }

    fn render_target_change(&mut self, index: usize, word: usize, value: u32) -> Result<()> {
        match word {
            offset::RENDER_TARGET_ADDRESS_HIGH => {
                self.context.set_render_target_address_high(index, value);
            }
            offset::RENDER_TARGET_ADDRESS_LOW => {
                self.context.set_render_target_address_low(index, value);
            }
            offset::RENDER_TARGET_WIDTH => {
                self.context.set_render_target_width(index, value);
            }
            offset::RENDER_TARGET_HEIGHT => {
                self.context.set_render_target_height(index, value);
            }
            offset::RENDER_TARGET_FORMAT => {
                let format = Format::from_render_target_format(value)?;
                self.context.set_render_target_format(index, format);
            }
            offset::RENDER_TARGET_TILE_MODE => {
                self.context
                    .set_render_target_tile_config(index, TileMode(value).to_tile_config());
            }
            offset::RENDER_TARGET_ARRAY_MODE => {
                let mode = ArrayMode(value);
                if mode.volume() {
                    return Err(EmulatorError::UnsupportedArrayVolume {
                        layer_count: u32::from(mode.layer_count()),
                    });
                }
                self.context
                    .set_render_target_layer_count(index, mode.layer_count());
            }
            offset::RENDER_TARGET_LAYER_STRIDE => {
                // The register carries the stride shifted right by two
                self.context.set_render_target_layer_stride(index, value << 2);
            }
            offset::RENDER_TARGET_BASE_LAYER => {
                self.context.set_render_target_base_layer(index, value)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Recompute a viewport axis from the latest scale and translate pair
    ///
    /// The two components arrive as independent writes, so either one
    /// changing recombines with the other's current register value.
    fn viewport_transform_change(&mut self, index: usize, word: usize) {
        let slot = offset::VIEWPORT_TRANSFORM_BASE + index * offset::VIEWPORT_TRANSFORM_WORDS;
        let registers = &self.registers;
        let component = |word: usize| -> f32 { f32::from_bits(registers[slot + word]) };

        match word {
            offset::VIEWPORT_SCALE_X | offset::VIEWPORT_TRANSLATE_X => {
                let scale = component(offset::VIEWPORT_SCALE_X);
                let translate = component(offset::VIEWPORT_TRANSLATE_X);
                self.context.set_viewport_x(index, scale, translate);
            }
            offset::VIEWPORT_SCALE_Y | offset::VIEWPORT_TRANSLATE_Y => {
                let scale = component(offset::VIEWPORT_SCALE_Y);
                let translate = component(offset::VIEWPORT_TRANSLATE_Y);
                self.context.set_viewport_y(index, scale, translate);
            }
            offset::VIEWPORT_SCALE_Z | offset::VIEWPORT_TRANSLATE_Z => {
                let scale = component(offset::VIEWPORT_SCALE_Z);
                let translate = component(offset::VIEWPORT_TRANSLATE_Z);
                self.context.set_viewport_z(index, scale, translate);
            }
            _ => {}
        }
    }

    fn scissor_change(&mut self, index: usize, word: usize, value: u32) {
        let slot = offset::SCISSOR_BASE + index * offset::SCISSOR_WORDS;
        match word {
            offset::SCISSOR_ENABLE => {
                let bounds = (value != 0).then(|| {
                    (
                        ScissorBounds(self.registers[slot + offset::SCISSOR_HORIZONTAL]),
                        ScissorBounds(self.registers[slot + offset::SCISSOR_VERTICAL]),
                    )
                });
                self.context.set_scissor(index, bounds);
            }
            offset::SCISSOR_HORIZONTAL => {
                self.context.set_scissor_horizontal(index, ScissorBounds(value));
            }
            offset::SCISSOR_VERTICAL => {
                self.context.set_scissor_vertical(index, ScissorBounds(value));
            }
            _ => {}
        }
    }

    /// Run the action a register write triggers, changed value or not
    fn handle_side_effects(&mut self, method: usize, argument: u32) -> Result<()> {
        match method {
            offset::MME_INSTRUCTION_RAM_LOAD => {
                let pointer = self.registers[offset::MME_INSTRUCTION_RAM_POINTER] as usize;
                self.macros.store_code(pointer, argument)?;
                self.registers[offset::MME_INSTRUCTION_RAM_POINTER] = pointer as u32 + 1;
            }

            offset::MME_START_ADDRESS_RAM_LOAD => {
                let pointer = self.registers[offset::MME_START_ADDRESS_RAM_POINTER] as usize;
                self.macros.store_position(pointer, argument)?;
                self.registers[offset::MME_START_ADDRESS_RAM_POINTER] = pointer as u32 + 1;
            }

            offset::MME_SHADOW_RAM_CONTROL => {
                self.shadow_control = ShadowRamControl::from_raw(argument);
            }

            offset::SYNCPOINT_ACTION => {
                let action = SyncpointAction(argument);
                if action.increment() {
                    log::debug!("incrementing syncpoint {}", action.id());
                    self.syncpoints.increment(action.id());
                }
            }

            offset::CLEAR_BUFFERS => {
                self.context.clear_buffers(ClearBuffers(argument))?;
            }

            offset::SEMAPHORE_INFO => {
                self.semaphore_action(SemaphoreInfo(argument))?;
            }

            offset::FIRMWARE_CALL_4 => {
                // The guest driver probes this call during initialization and
                // polls the scratch register for success
                self.registers[offset::FIRMWARE_SCRATCH] = 1;
            }

            _ => {}
        }
        Ok(())
    }

    fn semaphore_action(&mut self, info: SemaphoreInfo) -> Result<()> {
        match info.op() {
            SemaphoreOp::Release => {
                let payload = u64::from(self.registers[offset::SEMAPHORE_PAYLOAD]);
                self.write_semaphore_result(payload, info)
            }

            SemaphoreOp::Counter => match info.counter_type() {
                0 => self.write_semaphore_result(0, info),
                counter => {
                    log::warn!("unsupported semaphore counter type: 0x{:X}", counter);
                    Ok(())
                }
            },

            op => {
                log::warn!("unsupported semaphore operation: {:?}", op);
                Ok(())
            }
        }
    }

    /// Write a semaphore result to the guest address in the semaphore block
    ///
    /// One-word structures truncate the result to 32 bits; four-word
    /// structures append a timestamp in GPU ticks.
    fn write_semaphore_result(&self, value: u64, info: SemaphoreInfo) -> Result<()> {
        let address = (u64::from(self.registers[offset::SEMAPHORE_ADDRESS_HIGH]) << 32)
            | u64::from(self.registers[offset::SEMAPHORE_ADDRESS_LOW]);

        match info.structure_size() {
            SemaphoreStructureSize::OneWord => self
                .gpu
                .translator
                .write_virtual(address, &(value as u32).to_le_bytes()),

            SemaphoreStructureSize::FourWords => {
                let result = SemaphoreResult {
                    value,
                    timestamp: gpu_ticks_from_nanoseconds(self.clock.nanoseconds()),
                };
                self.gpu
                    .translator
                    .write_virtual(address, bytemuck::bytes_of(&result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::software::SoftwareBackend;
    use crate::core::memory::{AddressTranslator, FlatTranslator, HostRange};
    use parking_lot::Mutex;

    struct CountingSyncpoints {
        increments: Mutex<Vec<u16>>,
    }

    impl CountingSyncpoints {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                increments: Mutex::new(Vec::new()),
            })
        }
    }

    impl SyncpointSet for CountingSyncpoints {
        fn increment(&self, id: u16) {
            self.increments.lock().push(id);
        }
    }

    struct FixedClock(u64);

    impl MonotonicClock for FixedClock {
        fn nanoseconds(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingInterpreter {
        executions: Arc<Mutex<Vec<(u32, Vec<u32>)>>>,
    }

    impl MacroInterpreter for RecordingInterpreter {
        fn execute(
            &mut self,
            _engine: &mut Maxwell3D,
            start_offset: u32,
            arguments: &[u32],
        ) -> Result<()> {
            self.executions.lock().push((start_offset, arguments.to_vec()));
            Ok(())
        }
    }

    /// Immediately re-enters macro control space to provoke nesting
    struct ReentrantInterpreter;

    impl MacroInterpreter for ReentrantInterpreter {
        fn execute(
            &mut self,
            engine: &mut Maxwell3D,
            _start_offset: u32,
            _arguments: &[u32],
        ) -> Result<()> {
            engine.call_method(REGISTER_COUNT as u32, 0, true)
        }
    }

    struct Harness {
        engine: Maxwell3D,
        translator: Arc<FlatTranslator>,
        backend: Arc<SoftwareBackend>,
        syncpoints: Arc<CountingSyncpoints>,
        executions: Arc<Mutex<Vec<(u32, Vec<u32>)>>>,
    }

    fn harness() -> Harness {
        harness_with_clock(0)
    }

    fn harness_with_clock(nanoseconds: u64) -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();

        let backend = Arc::new(SoftwareBackend::new());
        let translator = Arc::new(FlatTranslator::new(0x100000));
        let gpu = Gpu::new(backend.clone(), translator.clone());
        let syncpoints = CountingSyncpoints::new();
        let interpreter = RecordingInterpreter::default();
        let executions = Arc::clone(&interpreter.executions);

        Harness {
            engine: Maxwell3D::new(
                gpu,
                Box::new(interpreter),
                syncpoints.clone(),
                Arc::new(FixedClock(nanoseconds)),
            ),
            translator,
            backend,
            syncpoints,
            executions,
        }
    }

    fn method(engine: &mut Maxwell3D, method: usize, argument: u32) {
        engine.call_method(method as u32, argument, true).unwrap();
    }

    /// Program render target `index` as a 16x16 linear RGBA8 surface
    fn bind_render_target(engine: &mut Maxwell3D, index: usize, address: u32) {
        let base = offset::RENDER_TARGET_BASE + index * offset::RENDER_TARGET_WORDS;
        method(engine, base + offset::RENDER_TARGET_ADDRESS_LOW, address);
        method(engine, base + offset::RENDER_TARGET_WIDTH, 16);
        method(engine, base + offset::RENDER_TARGET_HEIGHT, 16);
        method(engine, base + offset::RENDER_TARGET_TILE_MODE, 1 << 12);
        method(engine, base + offset::RENDER_TARGET_ARRAY_MODE, 1);
        method(engine, base + offset::RENDER_TARGET_FORMAT, 0xD5);
    }

    #[test]
    fn test_register_write_lands_in_register_file() {
        let mut h = harness();
        method(&mut h.engine, 0x100, 0x1234);
        assert_eq!(h.engine.register(0x100), 0x1234);
    }

    #[test]
    fn test_reset_registers_power_on_defaults() {
        let h = harness();
        assert_eq!(h.engine.register(offset::RASTERIZER_ENABLE), 1);
        assert_eq!(h.engine.register(offset::VIEWPORT_TRANSFORM_ENABLE), 1);

        let slot = offset::VIEWPORT_BASE + 3 * offset::VIEWPORT_WORDS;
        assert_eq!(
            h.engine.register(slot + offset::VIEWPORT_DEPTH_FAR),
            1.0f32.to_bits()
        );
        assert_eq!(h.engine.register(slot + offset::VIEWPORT_DEPTH_NEAR), 0);
    }

    #[test]
    fn test_redundant_write_skips_value_dispatch() {
        let mut h = harness();
        bind_render_target(&mut h.engine, 0, 0x4000);

        h.engine.graphics().render_target(0).unwrap().unwrap();
        assert!(h.engine.graphics().cached_render_target(0).is_some());

        // Same width again: the cached view must survive
        let width_method = offset::RENDER_TARGET_BASE + offset::RENDER_TARGET_WIDTH;
        method(&mut h.engine, width_method, 16);
        assert!(h.engine.graphics().cached_render_target(0).is_some());

        // A genuinely new width invalidates
        method(&mut h.engine, width_method, 32);
        assert!(h.engine.graphics().cached_render_target(0).is_none());
    }

    #[test]
    fn test_syncpoint_increment_fires_even_when_redundant() {
        let mut h = harness();
        let action = (1 << 20) | 0x12;
        method(&mut h.engine, offset::SYNCPOINT_ACTION, action);
        method(&mut h.engine, offset::SYNCPOINT_ACTION, action);
        assert_eq!(h.syncpoints.increments.lock().as_slice(), &[0x12, 0x12]);
    }

    #[test]
    fn test_syncpoint_without_increment_bit_does_nothing() {
        let mut h = harness();
        method(&mut h.engine, offset::SYNCPOINT_ACTION, 0x12);
        assert!(h.syncpoints.increments.lock().is_empty());
    }

    #[test]
    fn test_shadow_track_then_replay() {
        let mut h = harness();

        // Track is the power-on policy: the write is recorded
        method(&mut h.engine, 0x100, 5);

        method(&mut h.engine, offset::MME_SHADOW_RAM_CONTROL, 3);

        // Under replay the incoming argument is discarded
        method(&mut h.engine, 0x100, 9);
        assert_eq!(h.engine.register(0x100), 5);
    }

    #[test]
    fn test_shadow_passthrough_leaves_registers_alone() {
        let mut h = harness();
        method(&mut h.engine, offset::MME_SHADOW_RAM_CONTROL, 2);
        method(&mut h.engine, 0x100, 7);

        method(&mut h.engine, offset::MME_SHADOW_RAM_CONTROL, 3);
        method(&mut h.engine, 0x100, 9);

        // Nothing was tracked for 0x100, so replay substitutes the stale zero
        assert_eq!(h.engine.register(0x100), 0);
    }

    #[test]
    fn test_macro_batching_executes_once_with_all_arguments() {
        let mut h = harness();

        // Record program 0 starting at code offset 0x20
        method(&mut h.engine, offset::MME_START_ADDRESS_RAM_POINTER, 0);
        method(&mut h.engine, offset::MME_START_ADDRESS_RAM_LOAD, 0x20);

        let macro_method = REGISTER_COUNT as u32;
        h.engine.call_method(macro_method, 1, false).unwrap();
        h.engine.call_method(macro_method + 1, 2, false).unwrap();
        h.engine.call_method(macro_method + 1, 3, true).unwrap();

        assert_eq!(h.executions.lock().as_slice(), &[(0x20, vec![1, 2, 3])]);

        // The accumulator was cleared: a following invocation starts fresh
        h.engine.call_method(macro_method, 7, true).unwrap();
        assert_eq!(h.executions.lock().len(), 2);
        assert_eq!(h.executions.lock()[1], (0x20, vec![7]));
    }

    #[test]
    fn test_macro_method_selects_program_by_parity() {
        let mut h = harness();
        method(&mut h.engine, offset::MME_START_ADDRESS_RAM_POINTER, 2);
        method(&mut h.engine, offset::MME_START_ADDRESS_RAM_LOAD, 0x40);

        // Method 0xE04 is even: selects program (0xE04 - 0xE00) >> 1 = 2
        h.engine.call_method(REGISTER_COUNT as u32 + 4, 9, true).unwrap();
        assert_eq!(h.executions.lock().as_slice(), &[(0x40, vec![9])]);
    }

    #[test]
    fn test_macro_code_load_appends_and_overflows() {
        let mut h = harness();
        method(&mut h.engine, offset::MME_INSTRUCTION_RAM_POINTER, 0);
        method(&mut h.engine, offset::MME_INSTRUCTION_RAM_LOAD, 0xAAAA);
        method(&mut h.engine, offset::MME_INSTRUCTION_RAM_LOAD, 0xBBBB);

        assert_eq!(h.engine.macro_store().code()[0], 0xAAAA);
        assert_eq!(h.engine.macro_store().code()[1], 0xBBBB);
        assert_eq!(h.engine.register(offset::MME_INSTRUCTION_RAM_POINTER), 2);

        method(
            &mut h.engine,
            offset::MME_INSTRUCTION_RAM_POINTER,
            macros::MACRO_CODE_WORDS as u32,
        );
        assert_eq!(
            h.engine
                .call_method(offset::MME_INSTRUCTION_RAM_LOAD as u32, 0, true),
            Err(EmulatorError::MacroCodeExhausted {
                capacity: macros::MACRO_CODE_WORDS
            })
        );
    }

    #[test]
    fn test_reentrant_macro_execution_is_fatal() {
        let backend = Arc::new(SoftwareBackend::new());
        let translator = Arc::new(FlatTranslator::new(0x1000));
        let mut engine = Maxwell3D::new(
            Gpu::new(backend, translator),
            Box::new(ReentrantInterpreter),
            CountingSyncpoints::new(),
            Arc::new(FixedClock(0)),
        );

        assert_eq!(
            engine.call_method(REGISTER_COUNT as u32, 0, true),
            Err(EmulatorError::NestedMacroInvocation)
        );
    }

    #[test]
    fn test_viewport_transform_recombines_axis_components() {
        let mut h = harness();
        let slot = offset::VIEWPORT_TRANSFORM_BASE + 3 * offset::VIEWPORT_TRANSFORM_WORDS;
        method(&mut h.engine, slot + offset::VIEWPORT_SCALE_X, 2.0f32.to_bits());
        method(&mut h.engine, slot + offset::VIEWPORT_TRANSLATE_X, 1.0f32.to_bits());
        method(&mut h.engine, slot + offset::VIEWPORT_SCALE_Y, 3.0f32.to_bits());

        let viewport = *h.engine.graphics().viewport(3);
        assert_eq!(viewport.x, 1.0);
        assert_eq!(viewport.width, 4.0);
        assert_eq!(viewport.y, 3.0);
        assert_eq!(viewport.height, 6.0);
    }

    #[test]
    fn test_scissor_enable_uses_latest_bounds() {
        let mut h = harness();
        let slot = offset::SCISSOR_BASE + 2 * offset::SCISSOR_WORDS;
        method(
            &mut h.engine,
            slot + offset::SCISSOR_HORIZONTAL,
            (100 << 16) | 10,
        );
        method(
            &mut h.engine,
            slot + offset::SCISSOR_VERTICAL,
            (200 << 16) | 20,
        );
        method(&mut h.engine, slot + offset::SCISSOR_ENABLE, 1);

        let scissor = *h.engine.graphics().scissor(2);
        assert_eq!(
            (scissor.offset_x, scissor.width, scissor.offset_y, scissor.height),
            (10, 100, 20, 200)
        );

        method(&mut h.engine, slot + offset::SCISSOR_ENABLE, 0);
        assert_eq!(*h.engine.graphics().scissor(2), crate::core::gfx::DEFAULT_SCISSOR);
    }

    #[test]
    fn test_unsupported_render_target_format_is_fatal() {
        let mut h = harness();
        let format_method = offset::RENDER_TARGET_BASE + offset::RENDER_TARGET_FORMAT;
        assert_eq!(
            h.engine.call_method(format_method as u32, 0xC0, true),
            Err(EmulatorError::UnsupportedRenderTargetFormat { raw: 0xC0 })
        );
    }

    #[test]
    fn test_volumetric_array_mode_is_fatal() {
        let mut h = harness();
        let array_method = offset::RENDER_TARGET_BASE + offset::RENDER_TARGET_ARRAY_MODE;
        assert_eq!(
            h.engine.call_method(array_method as u32, (1 << 16) | 4, true),
            Err(EmulatorError::UnsupportedArrayVolume { layer_count: 4 })
        );
    }

    #[test]
    fn test_clear_trigger_clears_through_context() {
        let mut h = harness();
        bind_render_target(&mut h.engine, 0, 0x4000);
        for channel in 0..4 {
            method(
                &mut h.engine,
                offset::CLEAR_COLOR_BASE + channel,
                0x10 + channel as u32,
            );
        }

        // rgba bits set, render target id 0, layer 0
        method(&mut h.engine, offset::CLEAR_BUFFERS, 0b111100);
        assert_eq!(h.backend.clear_count(), 1);

        let view = h.engine.graphics().render_target(0).unwrap().unwrap();
        let guard = view.texture.lock();
        let data = h.backend.image_data(guard.backing().handle().unwrap()).unwrap();
        assert_eq!(&data[..4], &[0x10, 0x11, 0x12, 0x13]);
    }

    #[test]
    fn test_semaphore_release_one_word() {
        let mut h = harness();
        method(&mut h.engine, offset::SEMAPHORE_ADDRESS_HIGH, 0);
        method(&mut h.engine, offset::SEMAPHORE_ADDRESS_LOW, 0x800);
        method(&mut h.engine, offset::SEMAPHORE_PAYLOAD, 0x42);

        // Release, one-word structure
        method(&mut h.engine, offset::SEMAPHORE_INFO, 1 << 28);

        let mut buffer = [0u8; 4];
        h.translator
            .read(HostRange { address: 0x800, size: 4 }, &mut buffer)
            .unwrap();
        assert_eq!(u32::from_le_bytes(buffer), 0x42);
    }

    #[test]
    fn test_semaphore_release_four_words_appends_timestamp() {
        // 2500 ns = 4 * 625, exactly 4 * 384 ticks
        let mut h = harness_with_clock(2500);
        method(&mut h.engine, offset::SEMAPHORE_ADDRESS_LOW, 0x800);
        method(&mut h.engine, offset::SEMAPHORE_PAYLOAD, 0x99);
        method(&mut h.engine, offset::SEMAPHORE_INFO, 0);

        let mut buffer = [0u8; 16];
        h.translator
            .read(HostRange { address: 0x800, size: 16 }, &mut buffer)
            .unwrap();
        let value = u64::from_le_bytes(buffer[..8].try_into().unwrap());
        let timestamp = u64::from_le_bytes(buffer[8..].try_into().unwrap());
        assert_eq!(value, 0x99);
        assert_eq!(timestamp, 1536);
    }

    #[test]
    fn test_semaphore_zero_counter_writes_zero() {
        let mut h = harness();
        method(&mut h.engine, offset::SEMAPHORE_ADDRESS_LOW, 0x800);
        method(&mut h.engine, offset::SEMAPHORE_PAYLOAD, 0x55);
        h.translator.write_virtual(0x800, &[0xFF; 4]).unwrap();

        // Counter op, zero counter type, one-word structure
        method(&mut h.engine, offset::SEMAPHORE_INFO, 2 | (1 << 28));

        let mut buffer = [0u8; 4];
        h.translator
            .read(HostRange { address: 0x800, size: 4 }, &mut buffer)
            .unwrap();
        assert_eq!(u32::from_le_bytes(buffer), 0);
    }

    #[test]
    fn test_semaphore_unknown_counter_is_a_warning_no_op() {
        let mut h = harness();
        method(&mut h.engine, offset::SEMAPHORE_ADDRESS_LOW, 0x800);

        // Counter op with an unrecognized counter type
        method(&mut h.engine, offset::SEMAPHORE_INFO, 2 | (0x15 << 23) | (1 << 28));

        let mut buffer = [0u8; 4];
        h.translator
            .read(HostRange { address: 0x800, size: 4 }, &mut buffer)
            .unwrap();
        assert_eq!(buffer, [0; 4]);
    }

    #[test]
    fn test_firmware_call_sets_scratch_register() {
        let mut h = harness();
        method(&mut h.engine, offset::FIRMWARE_CALL_4, 0x12345678);
        assert_eq!(h.engine.register(offset::FIRMWARE_SCRATCH), 1);
    }

    #[test]
    fn test_macro_position_table_overflow_is_fatal() {
        let mut h = harness();
        method(
            &mut h.engine,
            offset::MME_START_ADDRESS_RAM_POINTER,
            macros::MACRO_POSITION_COUNT as u32,
        );
        assert_eq!(
            h.engine
                .call_method(offset::MME_START_ADDRESS_RAM_LOAD as u32, 0, true),
            Err(EmulatorError::MacroTableExhausted {
                capacity: macros::MACRO_POSITION_COUNT
            })
        );
    }

    #[test]
    fn test_interpreter_can_drive_engine_state() {
        struct WritingInterpreter;

        impl MacroInterpreter for WritingInterpreter {
            fn execute(
                &mut self,
                engine: &mut Maxwell3D,
                _start_offset: u32,
                arguments: &[u32],
            ) -> Result<()> {
                // A typical macro: forward its argument into a register
                engine.call_method(0x100, arguments[0], true)
            }
        }

        let backend = Arc::new(SoftwareBackend::new());
        let translator = Arc::new(FlatTranslator::new(0x1000));
        let mut engine = Maxwell3D::new(
            Gpu::new(backend, translator),
            Box::new(WritingInterpreter),
            CountingSyncpoints::new(),
            Arc::new(FixedClock(0)),
        );

        engine.call_method(REGISTER_COUNT as u32, 0xCAFE, true).unwrap();
        assert_eq!(engine.register(0x100), 0xCAFE);
    }

    #[test]
    fn test_sequential_macro_uploads_use_distinct_slots() {
        let mut h = harness();
        method(&mut h.engine, offset::MME_START_ADDRESS_RAM_POINTER, 0);
        method(&mut h.engine, offset::MME_START_ADDRESS_RAM_LOAD, 0x10);
        method(&mut h.engine, offset::MME_START_ADDRESS_RAM_LOAD, 0x30);
        assert_eq!(h.engine.macro_store().position(0), 0x10);
        assert_eq!(h.engine.macro_store().position(1), 0x30);
        assert_eq!(h.engine.register(offset::MME_START_ADDRESS_RAM_POINTER), 2);
    }
}

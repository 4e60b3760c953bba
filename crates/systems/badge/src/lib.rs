//! Badge console runtime: hosts one WebAssembly cartridge against the shared
//! memory map, rasterizer, flash and tone generator from `badge_core`.

mod config;
mod fault;
mod host;
mod snapshot;

pub use config::{RuntimeConfig, DEFAULT_CART_SIZE_LIMIT};
pub use fault::{render_crash_screen, FaultKind, GuestFault};
pub use host::{HostFault, TRACE_HISTORY};
pub use snapshot::{SnapshotError, StateSnapshot};

use badge_core::apu::AudioConsumer;
use badge_core::flash::{FlashError, FlashStore};
use badge_core::logging::{log, LogCategory, LogLevel};
use badge_core::memory_map::{
    Controls, ADDR_BATTERY_LEVEL, ADDR_CONTROLS, ADDR_FRAMEBUFFER, ADDR_LIGHT_LEVEL,
    ADDR_NEOPIXELS, ADDR_RED_LED, FRAMEBUFFER_SIZE, HEIGHT, MEMORY_PAGES, MEMORY_SIZE,
    NEOPIXEL_COUNT, NEOPIXEL_MASK, WIDTH,
};
use badge_core::types::{Composite, Frame};
use badge_core::Console;
use bitflags::bitflags;
use host::HostEnv;
use thiserror::Error;
use wasmer::{
    ExportError, FunctionEnv, Instance, Memory, MemoryError, MemoryType, Module, Store,
};

/// Display throughput used to estimate how long a composite takes.
pub const PIXELS_PER_MILLISECOND: f64 = 512.0;

bitflags! {
    /// Why `update` is currently inert. Empty means running.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PauseState: u8 {
        const CRASHED = 1;
        const REBOOTING = 2;
    }
}

#[derive(Debug, Error)]
pub enum BadgeError {
    #[error(transparent)]
    Guest(#[from] GuestFault),
    #[error("no cartridge loaded")]
    NoCartridge,
    #[error("failed to allocate linear memory: {0}")]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Flash(#[from] FlashError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// One console: a sandbox store, its fixed-size linear memory and the
/// instance of the loaded cartridge.
pub struct Runtime {
    store: Store,
    env: FunctionEnv<HostEnv>,
    memory: Memory,
    instance: Option<Instance>,
    cart: Option<Vec<u8>>,
    pause: PauseState,
    config: RuntimeConfig,
    warned_oversize: bool,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pause", &self.pause)
            .field("cart_bytes", &self.cart.as_ref().map(Vec::len))
            .field("config", &self.config)
            .finish()
    }
}

impl Runtime {
    pub fn new() -> Result<Self, BadgeError> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self, BadgeError> {
        let mut store = Store::default();
        let memory = Memory::new(
            &mut store,
            MemoryType::new(MEMORY_PAGES, Some(MEMORY_PAGES), false),
        )?;
        let env = FunctionEnv::new(&mut store, HostEnv::new(memory.clone()));
        Ok(Self {
            store,
            env,
            memory,
            instance: None,
            cart: None,
            pause: PauseState::REBOOTING,
            config,
            warned_oversize: false,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause
    }

    pub fn is_crashed(&self) -> bool {
        self.pause.contains(PauseState::CRASHED)
    }

    /// Compile and instantiate `cart`, then run `_start` and `_initialize`
    /// if exported. Any failure paints the crash screen before it is
    /// returned.
    pub fn load(&mut self, cart: &[u8]) -> Result<(), BadgeError> {
        self.pause.insert(PauseState::REBOOTING);
        self.instance = None;
        self.cart = Some(cart.to_vec());
        self.env.as_mut(&mut self.store).audio.reset();

        let limit = self.config.cart_size_limit;
        if cart.len() > limit && self.config.warn_on_oversize && !self.warned_oversize {
            self.warned_oversize = true;
            log(LogCategory::Runtime, LogLevel::Warn, || {
                format!(
                    "cart is larger than {limit} bytes; ensure the release build of your cart is small enough to be bundled"
                )
            });
        }

        match self.instantiate(cart) {
            Ok(instance) => {
                self.instance = Some(instance);
                self.pause.remove(PauseState::REBOOTING);
                log(LogCategory::Runtime, LogLevel::Info, || {
                    format!("loaded cart ({} bytes)", cart.len())
                });
                Ok(())
            }
            Err(fault) => Err(self.crash(fault).into()),
        }
    }

    fn instantiate(&mut self, cart: &[u8]) -> Result<Instance, GuestFault> {
        let module = Module::new(&self.store, cart).map_err(GuestFault::compile)?;
        let imports = host::imports(&mut self.store, &self.env, &self.memory);
        let instance =
            Instance::new(&mut self.store, &module, &imports).map_err(GuestFault::instantiation)?;
        for entry in ["_start", "_initialize"] {
            call_export(&mut self.store, &instance, entry)?;
        }
        Ok(instance)
    }

    /// Run the cartridge's `start` export if it has one.
    pub fn start(&mut self) -> Result<(), BadgeError> {
        let instance = self.instance.as_ref().ok_or(BadgeError::NoCartridge)?;
        match call_export(&mut self.store, instance, "start") {
            Ok(_) => Ok(()),
            Err(fault) => Err(self.crash(fault).into()),
        }
    }

    /// One tick: the cartridge's `update` export, then an audio flush.
    /// Does nothing while paused.
    pub fn update(&mut self) -> Result<(), BadgeError> {
        if !self.pause.is_empty() {
            return Ok(());
        }
        let Some(instance) = self.instance.as_ref() else {
            return Ok(());
        };
        let result = call_export(&mut self.store, instance, "update");
        self.env.as_mut(&mut self.store).audio.flush();
        match result {
            Ok(_) => Ok(()),
            Err(fault) => Err(self.crash(fault).into()),
        }
    }

    /// Clear `CRASHED`, optionally zeroing linear memory. Flash and
    /// `REBOOTING` are left alone.
    pub fn reset(&mut self, zero_memory: bool) {
        if zero_memory {
            self.with_host(|_, bytes| bytes.fill(0));
        }
        self.pause.remove(PauseState::CRASHED);
    }

    /// Reload `cart`, or the current cartridge when `None`. With
    /// `preserve_state` the memory and flash from before the reboot are
    /// restored instead of calling `start`.
    pub fn reboot(&mut self, cart: Option<&[u8]>, preserve_state: bool) -> Result<(), BadgeError> {
        let cart = match cart {
            Some(cart) => cart.to_vec(),
            None => self.cart.clone().ok_or(BadgeError::NoCartridge)?,
        };
        let snapshot = preserve_state.then(|| StateSnapshot::capture(self));

        self.reset(true);
        self.pause.insert(PauseState::REBOOTING);
        self.load(&cart)?;
        self.pause.remove(PauseState::REBOOTING);

        match snapshot {
            Some(snapshot) => snapshot.restore(self),
            None => self.start(),
        }
    }

    /// Render the crash screen for `fault`, set `CRASHED` and hand the fault
    /// back for the caller to return.
    fn crash(&mut self, fault: GuestFault) -> GuestFault {
        log(LogCategory::Runtime, LogLevel::Error, || {
            format!("cartridge crashed: {fault}")
        });
        self.pause.insert(PauseState::CRASHED);
        let title = self.config.crash_title.clone();
        self.with_host(|host, bytes| {
            render_crash_screen(
                &mut host.framebuffer.canvas(bytes),
                &title,
                fault.screen_text(),
            );
        });
        fault
    }

    fn with_host<R>(&mut self, f: impl FnOnce(&mut HostEnv, &mut [u8]) -> R) -> R {
        let mut env = self.env.clone().into_mut(&mut self.store);
        host::with_host(&mut env, f)
    }

    fn host(&self) -> &HostEnv {
        self.env.as_ref(&self.store)
    }

    fn read_memory(&self, addr: usize, buf: &mut [u8]) {
        let len = buf.len();
        if let Err(err) = self.memory.view(&self.store).read(addr as u64, buf) {
            log(LogCategory::Runtime, LogLevel::Error, || {
                format!("read of {len} bytes at {addr:#x} failed: {err}")
            });
        }
    }

    fn write_memory(&mut self, addr: usize, data: &[u8]) {
        if let Err(err) = self.memory.view(&self.store).write(addr as u64, data) {
            log(LogCategory::Runtime, LogLevel::Error, || {
                format!("write of {} bytes at {addr:#x} failed: {err}", data.len())
            });
        }
    }

    pub fn set_controls(&mut self, controls: Controls) {
        self.write_memory(ADDR_CONTROLS, &controls.bits().to_le_bytes());
    }

    pub fn controls(&self) -> Controls {
        let mut raw = [0u8; 2];
        self.read_memory(ADDR_CONTROLS, &mut raw);
        Controls::from_bits_retain(u16::from_le_bytes(raw))
    }

    pub fn set_light_level(&mut self, level: u16) {
        self.write_memory(ADDR_LIGHT_LEVEL, &level.to_le_bytes());
    }

    pub fn set_battery_level(&mut self, level: u16) {
        self.write_memory(ADDR_BATTERY_LEVEL, &level.to_le_bytes());
    }

    /// The five LED colors, 0x00RRGGBB.
    pub fn neopixels(&self) -> [u32; NEOPIXEL_COUNT] {
        let mut raw = [0u8; NEOPIXEL_COUNT * 4];
        self.read_memory(ADDR_NEOPIXELS, &mut raw);
        let mut pixels = [0u32; NEOPIXEL_COUNT];
        for (pixel, word) in pixels.iter_mut().zip(raw.chunks_exact(4)) {
            *pixel = u32::from_le_bytes([word[0], word[1], word[2], word[3]]) & NEOPIXEL_MASK;
        }
        pixels
    }

    pub fn red_led(&self) -> bool {
        let mut raw = [0u8; 1];
        self.read_memory(ADDR_RED_LED, &mut raw);
        raw[0] != 0
    }

    /// Packed little-endian RGB565 framebuffer bytes.
    pub fn framebuffer_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; FRAMEBUFFER_SIZE];
        self.read_memory(ADDR_FRAMEBUFFER, &mut bytes);
        bytes
    }

    /// Pixel touches since the last composite, without draining.
    pub fn pixels_changed(&self) -> usize {
        self.host().framebuffer.pixels_changed()
    }

    /// Hand the framebuffer to a display: converts it, drains the dirty
    /// counter and estimates the panel update time.
    pub fn composite(&mut self) -> Composite {
        let bytes = self.framebuffer_bytes();
        let pixels_changed = self
            .env
            .as_mut(&mut self.store)
            .framebuffer
            .count_changed_pixels_and_reset();
        Composite {
            frame: Frame::from_rgb565_le(WIDTH as u32, HEIGHT as u32, &bytes),
            pixels_changed,
            update_ms: pixels_changed as f64 / PIXELS_PER_MILLISECOND,
        }
    }

    /// A consumer handle for the audio thread.
    pub fn audio_consumer(&self) -> AudioConsumer {
        self.host().audio.consumer()
    }

    pub fn flash(&self) -> &FlashStore {
        &self.host().flash
    }

    /// Replace flash with a persisted image.
    pub fn load_flash(&mut self, image: &[u8]) -> Result<(), BadgeError> {
        self.env.as_mut(&mut self.store).flash.replace(image)?;
        Ok(())
    }

    /// A copy of the whole linear memory.
    pub fn memory_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; MEMORY_SIZE];
        self.read_memory(0, &mut bytes);
        bytes
    }

    pub(crate) fn restore_raw(&mut self, memory: &[u8], flash: &[u8]) -> Result<(), BadgeError> {
        self.env.as_mut(&mut self.store).flash.replace(flash)?;
        self.with_host(|_, bytes| {
            let n = bytes.len().min(memory.len());
            bytes[..n].copy_from_slice(&memory[..n]);
        });
        Ok(())
    }

    /// Most recent `trace` output, oldest first.
    pub fn recent_traces(&self) -> Vec<String> {
        self.host().traces.iter().cloned().collect()
    }

    /// Return debug information useful for inspecting runtime state.
    pub fn debug_state(&self) -> serde_json::Value {
        let host = self.host();
        serde_json::json!({
            "pause": {
                "crashed": self.pause.contains(PauseState::CRASHED),
                "rebooting": self.pause.contains(PauseState::REBOOTING),
            },
            "cart_bytes": self.cart.as_ref().map(Vec::len),
            "pixels_changed": host.framebuffer.pixels_changed(),
            "audio": {
                "staged": host.audio.staged(),
                "queued": host.audio.queued(),
                "ticks": host.audio.ticks(),
            },
            "flash_pages_used": host.flash.used_pages(),
            "controls": self.controls().bits(),
        })
    }

    /// Read a single framebuffer pixel.
    pub fn pixel(&self, x: i32, y: i32) -> Option<u16> {
        if !(0..WIDTH as i32).contains(&x) || !(0..HEIGHT as i32).contains(&y) {
            return None;
        }
        let mut raw = [0u8; 2];
        self.read_memory(ADDR_FRAMEBUFFER + (y as usize * WIDTH + x as usize) * 2, &mut raw);
        Some(u16::from_le_bytes(raw))
    }
}

/// Call a `() -> ()` export by name. A missing export, or one that is not a
/// function, is skipped and reported as `false`.
fn call_export(store: &mut Store, instance: &Instance, name: &str) -> Result<bool, GuestFault> {
    match instance.exports.get_typed_function::<(), ()>(store, name) {
        Ok(function) => {
            function.call(store).map_err(GuestFault::runtime)?;
            Ok(true)
        }
        Err(ExportError::Missing(_)) => Ok(false),
        Err(err) if instance.exports.get_function(name).is_err() => {
            log(LogCategory::Runtime, LogLevel::Debug, || {
                format!("export `{name}` is not a function: {err}")
            });
            Ok(false)
        }
        Err(err) => Err(GuestFault::export(name, err)),
    }
}

impl Console for Runtime {
    type Error = BadgeError;

    fn load(&mut self, cart: &[u8]) -> Result<(), Self::Error> {
        Runtime::load(self, cart)
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        Runtime::start(self)
    }

    fn update(&mut self) -> Result<(), Self::Error> {
        Runtime::update(self)
    }

    fn reset(&mut self, zero_memory: bool) {
        Runtime::reset(self, zero_memory)
    }

    fn set_controls(&mut self, controls: Controls) {
        Runtime::set_controls(self, controls)
    }

    fn composite(&mut self) -> Composite {
        Runtime::composite(self)
    }

    fn save_state(&self) -> Vec<u8> {
        StateSnapshot::capture(self).to_bytes()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        StateSnapshot::from_bytes(data)?.restore(self)
    }

    fn supports_save_states(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_rebooting_without_a_cart() {
        let mut runtime = Runtime::new().unwrap();
        assert_eq!(runtime.pause_state(), PauseState::REBOOTING);
        runtime.update().unwrap();
        assert!(matches!(runtime.start(), Err(BadgeError::NoCartridge)));
        assert!(matches!(
            runtime.reboot(None, false),
            Err(BadgeError::NoCartridge)
        ));
    }

    #[test]
    fn registers_are_little_endian() {
        let mut runtime = Runtime::new().unwrap();
        runtime.set_controls(Controls::A | Controls::RIGHT);
        runtime.set_light_level(0x1234);
        runtime.set_battery_level(0xBEEF);
        let memory = runtime.memory_bytes();
        assert_eq!(&memory[ADDR_CONTROLS..ADDR_CONTROLS + 2], &[0x04, 0x01]);
        assert_eq!(&memory[ADDR_LIGHT_LEVEL..ADDR_LIGHT_LEVEL + 2], &[0x34, 0x12]);
        assert_eq!(
            &memory[ADDR_BATTERY_LEVEL..ADDR_BATTERY_LEVEL + 2],
            &[0xEF, 0xBE]
        );
        assert_eq!(runtime.controls(), Controls::A | Controls::RIGHT);
    }

    #[test]
    fn neopixels_are_masked_to_24_bits() {
        let mut runtime = Runtime::new().unwrap();
        runtime.write_memory(ADDR_NEOPIXELS, &0xFF12_3456u32.to_le_bytes());
        runtime.write_memory(ADDR_NEOPIXELS + 16, &0x00AB_CDEFu32.to_le_bytes());
        runtime.write_memory(ADDR_RED_LED, &[1]);
        assert_eq!(runtime.neopixels(), [0x12_3456, 0, 0, 0, 0xAB_CDEF]);
        assert!(runtime.red_led());
    }

    #[test]
    fn composite_drains_dirty_pixels() {
        let mut runtime = Runtime::new().unwrap();
        runtime.with_host(|host, bytes| {
            let mut canvas = host.framebuffer.canvas(bytes);
            canvas.fill_screen(0xF800);
        });
        let composite = runtime.composite();
        assert_eq!(composite.pixels_changed, WIDTH * HEIGHT);
        assert_eq!(composite.update_ms, 40.0);
        assert_eq!(composite.frame.pixels[0], 0xFFFF0000);
        assert_eq!(runtime.composite().pixels_changed, 0);
        assert_eq!(runtime.pixel(0, 0), Some(0xF800));
    }

    #[test]
    fn reset_zeroes_memory_but_keeps_flash() {
        let mut runtime = Runtime::new().unwrap();
        runtime.set_light_level(7);
        runtime.load_flash(&vec![9u8; badge_core::flash::FLASH_SIZE]).unwrap();
        runtime.reset(true);
        assert!(runtime.memory_bytes().iter().all(|&b| b == 0));
        assert_eq!(runtime.flash().as_bytes()[0], 9);
        assert!(runtime.pause_state().contains(PauseState::REBOOTING));
    }

    #[test]
    fn debug_state_reports_pause_flags() {
        let runtime = Runtime::new().unwrap();
        let state = runtime.debug_state();
        assert_eq!(state["pause"]["rebooting"], true);
        assert_eq!(state["pause"]["crashed"], false);
        assert!(state["cart_bytes"].is_null());
        assert_eq!(state["flash_pages_used"], 0);
    }
}

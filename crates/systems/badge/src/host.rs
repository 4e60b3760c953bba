//! Host capabilities bound into the cartridge's `env` import namespace.
//!
//! Every capability runs with the guest suspended. Pointers handed over by
//! the guest are paired with a length and checked against linear memory
//! before any byte is touched; a bad span raises [`HostFault::OutOfBounds`]
//! and aborts the guest call.

use std::collections::VecDeque;
use std::ops::Range;

use badge_core::apu::AudioSampleBridge;
use badge_core::flash::{FlashError, FlashStore, FLASH_PAGE_SIZE};
use badge_core::framebuffer::{BlitFlags, BlitRegion, Canvas, Framebuffer};
use badge_core::logging::{log, LogCategory, LogLevel};
use badge_core::memory_map::optional_color;
use thiserror::Error;
use wasmer::{AsStoreRef, Function, FunctionEnv, FunctionEnvMut, Imports, Memory, Store};

/// Recent `trace` lines kept for inspection.
pub const TRACE_HISTORY: usize = 64;

/// A deliberate abort raised by a host capability.
#[derive(Debug, Error)]
pub enum HostFault {
    #[error("guest span {ptr:#x}+{len} is outside linear memory")]
    OutOfBounds { ptr: u32, len: u32 },
    #[error(transparent)]
    Flash(#[from] FlashError),
}

impl HostFault {
    /// Crash screen text.
    pub fn screen_text(&self) -> &'static str {
        match self {
            HostFault::OutOfBounds { .. } => {
                "The cartridge has\npassed a pointer\noutside of its\nmemory.\n\n\n\nHit R to reboot."
            }
            HostFault::Flash(FlashError::PageOutOfRange { .. }) => {
                "The cartridge has\nwritten to a flash\npage that does\nnot exist.\n\n\n\nHit R to reboot."
            }
            HostFault::Flash(_) => "The cartridge has\nmisused flash.\n\n\n\nHit R to reboot.",
        }
    }
}

/// State shared by every host capability.
pub struct HostEnv {
    pub memory: Memory,
    pub framebuffer: Framebuffer,
    pub flash: FlashStore,
    pub audio: AudioSampleBridge,
    pub traces: VecDeque<String>,
}

impl HostEnv {
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            framebuffer: Framebuffer::new(),
            flash: FlashStore::new(),
            audio: AudioSampleBridge::new(),
            traces: VecDeque::with_capacity(TRACE_HISTORY),
        }
    }
}

/// Run `f` over the whole of linear memory.
pub(crate) fn with_guest_memory<R>(
    memory: &Memory,
    store: &impl AsStoreRef,
    f: impl FnOnce(&mut [u8]) -> R,
) -> R {
    let view = memory.view(store);
    // SAFETY: the memory has equal minimum and maximum page counts so it is
    // never reallocated, and guest code is suspended while the host holds
    // this slice. Nothing else reads or writes it until `f` returns.
    let bytes = unsafe { view.data_unchecked_mut() };
    f(bytes)
}

/// Run `f` with the host state and linear memory borrowed together.
pub(crate) fn with_host<R>(
    env: &mut FunctionEnvMut<HostEnv>,
    f: impl FnOnce(&mut HostEnv, &mut [u8]) -> R,
) -> R {
    let (host, store) = env.data_and_store_mut();
    let memory = host.memory.clone();
    with_guest_memory(&memory, &store, |bytes| f(host, bytes))
}

/// Validate a guest `(ptr, len)` pair against a memory of `size` bytes.
pub(crate) fn guest_span(size: usize, ptr: i32, len: i32) -> Result<Range<usize>, HostFault> {
    let (ptr, len) = (ptr as u32, len as u32);
    let start = ptr as usize;
    match start.checked_add(len as usize) {
        Some(end) if end <= size => Ok(start..end),
        _ => Err(HostFault::OutOfBounds { ptr, len }),
    }
}

fn draw(env: &mut FunctionEnvMut<HostEnv>, f: impl FnOnce(&mut Canvas)) {
    with_host(env, |host, bytes| f(&mut host.framebuffer.canvas(bytes)));
}

fn rect(mut env: FunctionEnvMut<HostEnv>, stroke: i32, fill: i32, x: i32, y: i32, w: i32, h: i32) {
    draw(&mut env, |canvas| {
        canvas.draw_rect(optional_color(stroke), optional_color(fill), x, y, w, h)
    });
}

fn oval(mut env: FunctionEnvMut<HostEnv>, stroke: i32, fill: i32, x: i32, y: i32, w: i32, h: i32) {
    draw(&mut env, |canvas| {
        canvas.draw_oval(optional_color(stroke), optional_color(fill), x, y, w, h)
    });
}

fn line(mut env: FunctionEnvMut<HostEnv>, color: i32, x1: i32, y1: i32, x2: i32, y2: i32) {
    draw(&mut env, |canvas| canvas.draw_line(color as u16, x1, y1, x2, y2));
}

fn hline(mut env: FunctionEnvMut<HostEnv>, color: i32, x: i32, y: i32, len: i32) {
    draw(&mut env, |canvas| canvas.draw_hline(color as u16, x, y, len));
}

fn vline(mut env: FunctionEnvMut<HostEnv>, color: i32, x: i32, y: i32, len: i32) {
    draw(&mut env, |canvas| canvas.draw_vline(color as u16, x, y, len));
}

fn text(
    mut env: FunctionEnvMut<HostEnv>,
    text_color: i32,
    background: i32,
    ptr: i32,
    len: i32,
    x: i32,
    y: i32,
) -> Result<(), HostFault> {
    with_host(&mut env, |host, bytes| {
        let span = guest_span(bytes.len(), ptr, len)?;
        // Copied out first: the string may live inside the framebuffer.
        let text = bytes[span].to_vec();
        host.framebuffer.canvas(bytes).draw_text(
            optional_color(text_color),
            optional_color(background),
            &text,
            x,
            y,
        );
        Ok(())
    })
}

#[allow(clippy::too_many_arguments)]
fn blit(
    mut env: FunctionEnvMut<HostEnv>,
    sprite_ptr: i32,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    src_x: i32,
    src_y: i32,
    stride: i32,
    flags: i32,
) {
    let region = BlitRegion {
        dst_x: x,
        dst_y: y,
        width,
        height,
        src_x,
        src_y,
        src_stride: stride,
    };
    let flags = BlitFlags::from_bits_truncate(flags as u32);
    draw(&mut env, |canvas| {
        canvas.blit_from_memory(sprite_ptr as u32 as usize, &region, flags)
    });
}

fn tone(mut env: FunctionEnvMut<HostEnv>, frequency: i32, duration: i32, volume: i32, flags: i32) {
    env.data_mut()
        .audio
        .tone(frequency as u32, duration as u32, volume as u32, flags as u32);
}

fn read_flash(
    mut env: FunctionEnvMut<HostEnv>,
    offset: i32,
    dst_ptr: i32,
    len: i32,
) -> Result<i32, HostFault> {
    with_host(&mut env, |host, bytes| {
        let span = guest_span(bytes.len(), dst_ptr, len)?;
        let copied = host.flash.read(offset as u32 as usize, &mut bytes[span]);
        Ok(copied as i32)
    })
}

fn write_flash_page(mut env: FunctionEnvMut<HostEnv>, page: i32, src_ptr: i32) -> Result<(), HostFault> {
    with_host(&mut env, |host, bytes| {
        let span = guest_span(bytes.len(), src_ptr, FLASH_PAGE_SIZE as i32)?;
        host.flash.write_page(page as u32, &bytes[span])?;
        Ok(())
    })
}

fn trace(mut env: FunctionEnvMut<HostEnv>, ptr: i32, len: i32) -> Result<(), HostFault> {
    with_host(&mut env, |host, bytes| {
        let span = guest_span(bytes.len(), ptr, len)?;
        let message = String::from_utf8_lossy(&bytes[span]).into_owned();
        log(LogCategory::Guest, LogLevel::Info, || message.clone());
        if host.traces.len() == TRACE_HISTORY {
            host.traces.pop_front();
        }
        host.traces.push_back(message);
        Ok(())
    })
}

/// The `env` namespace handed to every cartridge: the shared memory plus
/// the fixed capability table.
pub(crate) fn imports(store: &mut Store, env: &FunctionEnv<HostEnv>, memory: &Memory) -> Imports {
    let table = [
        ("rect", Function::new_typed_with_env(store, env, rect)),
        ("oval", Function::new_typed_with_env(store, env, oval)),
        ("line", Function::new_typed_with_env(store, env, line)),
        ("hline", Function::new_typed_with_env(store, env, hline)),
        ("vline", Function::new_typed_with_env(store, env, vline)),
        ("text", Function::new_typed_with_env(store, env, text)),
        ("blit", Function::new_typed_with_env(store, env, blit)),
        ("tone", Function::new_typed_with_env(store, env, tone)),
        ("read_flash", Function::new_typed_with_env(store, env, read_flash)),
        (
            "write_flash_page",
            Function::new_typed_with_env(store, env, write_flash_page),
        ),
        ("trace", Function::new_typed_with_env(store, env, trace)),
    ];

    let mut imports = Imports::new();
    imports.define("env", "memory", memory.clone());
    for (name, function) in table {
        imports.define("env", name, function);
    }
    imports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_inside_memory_are_accepted() {
        assert_eq!(guest_span(100, 0, 100).unwrap(), 0..100);
        assert_eq!(guest_span(100, 40, 0).unwrap(), 40..40);
        assert_eq!(guest_span(100, 100, 0).unwrap(), 100..100);
    }

    #[test]
    fn spans_past_the_end_are_rejected() {
        assert!(matches!(
            guest_span(100, 90, 11),
            Err(HostFault::OutOfBounds { ptr: 90, len: 11 })
        ));
        assert!(guest_span(100, 101, 0).is_err());
    }

    #[test]
    fn negative_values_are_treated_as_unsigned() {
        assert!(guest_span(100, -1, 1).is_err());
        assert!(guest_span(100, 0, -1).is_err());
    }

    #[test]
    fn crash_text_fits_the_screen() {
        let faults = [
            HostFault::OutOfBounds { ptr: 0, len: 0 },
            HostFault::Flash(FlashError::PageOutOfRange { page: 9000 }),
            HostFault::Flash(FlashError::PageSize { len: 3 }),
        ];
        for fault in faults {
            for line in fault.screen_text().lines() {
                assert!(line.len() <= 18, "{line:?} is too wide");
            }
        }
    }
}

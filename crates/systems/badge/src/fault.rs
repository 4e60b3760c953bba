//! Classification of cartridge faults and the crash screen they produce.

use std::error::Error as StdError;
use std::fmt;

use badge_core::framebuffer::Canvas;
use badge_core::graphics::{font::GLYPH_SIZE, Rgb565};
use badge_core::memory_map::WIDTH;
use thiserror::Error;
use wasmer::{CompileError, ExportError, InstantiationError, RuntimeError};
use wasmer_types::TrapCode;

use crate::host::HostFault;

const REBOOT_HINT: &str = "\n\n\n\nHit R to reboot.";
const CONSOLE_HINT: &str = "\n\n\nSee console for\nmore details.";

const HEADER_Y: i32 = 20;
const MESSAGE_X: i32 = 9;
const MESSAGE_Y: i32 = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    TrapUnreachable,
    TrapOutOfBounds,
    TrapOther,
    LinkMissingImport,
    CompileCorrupted,
    Application,
    Unknown,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::TrapUnreachable => "unreachable trap",
            FaultKind::TrapOutOfBounds => "out of bounds trap",
            FaultKind::TrapOther => "trap",
            FaultKind::LinkMissingImport => "link error",
            FaultKind::CompileCorrupted => "compile error",
            FaultKind::Application => "host fault",
            FaultKind::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// A fault raised while loading or running a cartridge.
#[derive(Debug, Error)]
#[error("{kind}: {detail}")]
pub struct GuestFault {
    kind: FaultKind,
    detail: String,
    screen_text: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl GuestFault {
    fn new(
        kind: FaultKind,
        detail: String,
        screen_text: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            detail,
            screen_text,
            source,
        }
    }

    /// The guest image could not be compiled.
    pub fn compile(err: CompileError) -> Self {
        Self::new(
            FaultKind::CompileCorrupted,
            err.to_string(),
            format!("The cartridge is\ncorrupted.{CONSOLE_HINT}"),
            Some(Box::new(err)),
        )
    }

    /// Instantiation failed, either while linking imports or in the
    /// module's own start function.
    pub fn instantiation(err: InstantiationError) -> Self {
        match err {
            InstantiationError::Link(link) => Self::new(
                FaultKind::LinkMissingImport,
                link.to_string(),
                format!("The cartridge has\ntried to import\na missing function.{CONSOLE_HINT}"),
                Some(Box::new(link)),
            ),
            InstantiationError::Start(trap) => Self::runtime(trap),
            other => Self::unknown(other.to_string()),
        }
    }

    /// Sort a runtime error into a trap kind, or recover the host fault that
    /// raised it.
    pub fn runtime(err: RuntimeError) -> Self {
        if let Some(host) = err.downcast_ref::<HostFault>() {
            let detail = host.to_string();
            let text = host.screen_text();
            if matches!(host, HostFault::OutOfBounds { .. }) {
                return Self::new(
                    FaultKind::TrapOutOfBounds,
                    detail,
                    text.to_string(),
                    Some(Box::new(err)),
                );
            }
            return Self::application(detail, text, err);
        }

        let (kind, text) = match err.clone().to_trap() {
            Some(TrapCode::UnreachableCodeReached) => (
                FaultKind::TrapUnreachable,
                "The cartridge has\nreached a code \nsegment marked as\nunreachable.",
            ),
            Some(TrapCode::HeapAccessOutOfBounds | TrapCode::TableAccessOutOfBounds) => (
                FaultKind::TrapOutOfBounds,
                "The cartridge has\nattempted a memory\naccess that is\nout of bounds.",
            ),
            Some(_) => (FaultKind::TrapOther, "The cartridge has\ncrashed."),
            None => {
                let detail = err.message();
                return Self::new(
                    FaultKind::Unknown,
                    detail,
                    format!("Unknown error.{CONSOLE_HINT}"),
                    Some(Box::new(err)),
                );
            }
        };
        Self::new(
            kind,
            err.message(),
            format!("{text}{REBOOT_HINT}"),
            Some(Box::new(err)),
        )
    }

    /// An entry point exported with the wrong type.
    pub fn export(name: &str, err: ExportError) -> Self {
        Self::new(
            FaultKind::Unknown,
            format!("export `{name}`: {err}"),
            format!("Unknown error.{CONSOLE_HINT}"),
            Some(Box::new(err)),
        )
    }

    pub fn unknown(detail: String) -> Self {
        Self::new(
            FaultKind::Unknown,
            detail,
            format!("Unknown error.{CONSOLE_HINT}"),
            None,
        )
    }

    /// A deliberate abort from a host capability. `screen_text` is shown
    /// verbatim.
    pub(crate) fn application(detail: String, screen_text: &str, source: RuntimeError) -> Self {
        Self::new(
            FaultKind::Application,
            detail,
            screen_text.to_string(),
            Some(Box::new(source)),
        )
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Console-facing description.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Text rendered below the crash screen header.
    pub fn screen_text(&self) -> &str {
        &self.screen_text
    }
}

/// Paint the full-screen crash diagnostic: a framed ` title ` header bar
/// centered near the top and `message` below it.
pub fn render_crash_screen(canvas: &mut Canvas, title: &str, message: &str) {
    let blue = Rgb565::pack(5, 10, 5);
    let grey = Rgb565::pack(25, 50, 25);

    let header = format!(" {title} ");
    let header_width = GLYPH_SIZE.saturating_mul(header.len() as i32);
    let header_x = (WIDTH as i32 - header_width) / 2;

    canvas.fill_screen(blue);
    canvas.draw_hline(grey, header_x, HEADER_Y - 1, header_width);
    canvas.draw_text(Some(blue), Some(grey), header.as_bytes(), header_x, HEADER_Y);
    canvas.draw_text(Some(grey), Some(blue), message.as_bytes(), MESSAGE_X, MESSAGE_Y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use badge_core::flash::FlashError;
    use badge_core::framebuffer::Framebuffer;
    use badge_core::memory_map::{FRAMEBUFFER_END, PIXEL_COUNT};

    #[test]
    fn flash_aborts_are_application_faults() {
        let host = HostFault::Flash(FlashError::PageOutOfRange { page: 8000 });
        let text = host.screen_text();
        let fault = GuestFault::runtime(RuntimeError::user(Box::new(host)));
        assert_eq!(fault.kind(), FaultKind::Application);
        assert_eq!(fault.screen_text(), text);
        assert!(fault.detail().contains("8000"));
        assert!(fault.to_string().starts_with("host fault: "));
        assert!(StdError::source(&fault).is_some());
    }

    #[test]
    fn unknown_points_at_the_console() {
        let fault = GuestFault::unknown("boom".into());
        assert_eq!(fault.kind(), FaultKind::Unknown);
        assert!(fault.screen_text().starts_with("Unknown error."));
        assert!(fault.screen_text().ends_with("more details."));
    }

    #[test]
    fn user_errors_keep_their_host_fault() {
        let err = RuntimeError::user(Box::new(HostFault::OutOfBounds { ptr: 4, len: 8 }));
        let fault = GuestFault::runtime(err);
        assert_eq!(fault.kind(), FaultKind::TrapOutOfBounds);
        assert!(fault.screen_text().contains("pointer"));
    }

    #[test]
    fn plain_runtime_errors_are_unknown() {
        let fault = GuestFault::runtime(RuntimeError::new("mystery"));
        assert_eq!(fault.kind(), FaultKind::Unknown);
        assert_eq!(fault.detail(), "mystery");
    }

    #[test]
    fn crash_screen_covers_the_display() {
        let mut fb = Framebuffer::new();
        let mut memory = vec![0u8; FRAMEBUFFER_END];
        render_crash_screen(&mut fb.canvas(&mut memory), "BADGE SIM", "Oops.");

        let blue = Rgb565::pack(5, 10, 5);
        let grey = Rgb565::pack(25, 50, 25);
        assert_eq!(Framebuffer::pixel(&memory, 0, 0), Some(blue));
        assert_eq!(Framebuffer::pixel(&memory, 159, 127), Some(blue));
        // " BADGE SIM " is 11 cells wide, so the bar starts at x = 36.
        assert_eq!(Framebuffer::pixel(&memory, 36, HEADER_Y - 1), Some(grey));
        assert_eq!(Framebuffer::pixel(&memory, 35, HEADER_Y - 1), Some(blue));
        // The leading space cell is all background.
        assert_eq!(Framebuffer::pixel(&memory, 36, HEADER_Y), Some(grey));
        assert!(fb.pixels_changed() > PIXEL_COUNT);
    }
}

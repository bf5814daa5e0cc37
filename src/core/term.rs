use std::io::{self, Write};

use once_cell::sync::Lazy;

/// Terminal control sequences used while relaying fuzzer status screens
pub struct TermCodes {
    pub clear: &'static [u8],
    pub cursor_hide: &'static [u8],
    pub cursor_show: &'static [u8],
    pub reset: &'static [u8],
    pub gray: &'static [u8],
    /// Select line drawing charset as G1
    pub set_g1: &'static [u8],
    /// Back to ASCII for G1
    pub reset_g1: &'static [u8],
    /// Shift into / out of G1 drawing mode
    pub box_start: &'static [u8],
    pub box_stop: &'static [u8],
}

pub static TERM: TermCodes = TermCodes {
    clear: b"\x1b[H\x1b[2J",
    cursor_hide: b"\x1b[?25l",
    cursor_show: b"\x1b[?25h",
    reset: b"\x1b[0m",
    gray: b"\x1b[1;90m",
    set_g1: b"\x1b)0",
    reset_g1: b"\x1b)B",
    box_start: b"\x0e",
    box_stop: b"\x0f",
};

/// Leaves drawing mode and restores colors and cursor
pub static RESTORE: Lazy<Vec<u8>> = Lazy::new(|| {
    [TERM.box_stop, TERM.reset, TERM.reset_g1, TERM.cursor_show].concat()
});

/// Bottom border of the AFL status box. With a half-drawn screen in the ring
/// buffer it ends up at the top, so it is moved back to the bottom.
pub const BOX_BOTTOM: &[u8] = b"mqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqj";

pub static BOX_BOTTOM_DRAWN: Lazy<Vec<u8>> = Lazy::new(|| {
    [
        TERM.set_g1,
        TERM.box_start,
        TERM.gray,
        BOX_BOTTOM,
        TERM.box_stop,
        TERM.reset,
        TERM.reset_g1,
    ]
    .concat()
});

pub fn clear_screen(out: &mut impl Write) -> io::Result<()> {
    out.write_all(TERM.clear)?;
    out.flush()
}

pub fn restore_terminal(out: &mut impl Write) -> io::Result<()> {
    out.write_all(&RESTORE)?;
    out.flush()
}

fn strip_box_bottom(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest
        .windows(BOX_BOTTOM.len())
        .position(|window| window == BOX_BOTTOM)
    {
        out.extend_from_slice(&rest[..pos]);
        rest = &rest[pos + BOX_BOTTOM.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Write one frame of captured output
pub fn draw_frame(out: &mut impl Write, lines: &[Vec<u8>], workaround: bool) -> io::Result<()> {
    for (i, line) in lines.iter().enumerate() {
        if workaround && i == 0 {
            out.write_all(&strip_box_bottom(line))?;
        } else {
            out.write_all(line)?;
        }
    }
    if workaround && !lines.is_empty() {
        out.write_all(&BOX_BOTTOM_DRAWN)?;
    }
    out.flush()
}

//! PS/2 keyboard driver
//!
//! Scancodes from port 0x60 are decoded by the `pc_keyboard` crate
//! (scancode set 1, US 104-key layout, which owns the caps/shift
//! translation tables). This module layers on what the crate does not do:
//! Ctrl/Alt latches, the Alt+F1..F3 terminal switch, Ctrl+L
//! clear-and-replay, and the 128-byte line editor feeding each terminal's
//! read queue.
//!
//! Decoding and line editing are hardware-free so the host test harness can
//! drive them with raw scancode streams; only the IRQ plumbing and the echo
//! side effects are bare-metal.

use pc_keyboard::{layouts::Us104Key, DecodedKey, HandleControl, KeyCode, KeyState, Keyboard,
                  ScancodeSet1};

use crate::terminal::TERMINAL_COUNT;

/// What one scancode asks the kernel to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Nothing observable (modifier edges, releases, swallowed keys).
    Nothing,
    /// A printable character or newline for the line editor.
    Char(u8),
    /// Erase the last character of the pending line.
    Backspace,
    /// Alt+F1..F3: make the given terminal visible.
    SwitchTerminal(usize),
    /// Ctrl+L: clear the visible terminal, reprint the prompt, replay the
    /// pending line.
    ClearAndReplay,
}

/// Scancode decoder plus the modifier edges the layout crate leaves to us.
pub struct Decoder {
    inner: Keyboard<Us104Key, ScancodeSet1>,
    ctrl: bool,
    alt: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            inner: Keyboard::new(ScancodeSet1::new(), Us104Key, HandleControl::Ignore),
            ctrl: false,
            alt: false,
        }
    }

    /// Fold one scancode byte into the modifier state and translate it to
    /// a [`KeyAction`].
    pub fn handle_scancode(&mut self, code: u8) -> KeyAction {
        let event = match self.inner.add_byte(code) {
            Ok(Some(event)) => event,
            _ => return KeyAction::Nothing,
        };

        let pressed = event.state != KeyState::Up;
        match event.code {
            KeyCode::LControl | KeyCode::RControl => {
                self.ctrl = pressed;
                return KeyAction::Nothing;
            }
            KeyCode::LAlt | KeyCode::RAltGr => {
                self.alt = pressed;
                return KeyAction::Nothing;
            }
            KeyCode::F1 if pressed && self.alt => return KeyAction::SwitchTerminal(0),
            KeyCode::F2 if pressed && self.alt => return KeyAction::SwitchTerminal(1),
            KeyCode::F3 if pressed && self.alt => return KeyAction::SwitchTerminal(2),
            KeyCode::Backspace => {
                return if pressed {
                    KeyAction::Backspace
                } else {
                    KeyAction::Nothing
                };
            }
            KeyCode::Return | KeyCode::NumpadEnter => {
                return if pressed {
                    KeyAction::Char(b'\n')
                } else {
                    KeyAction::Nothing
                };
            }
            _ => {}
        }

        match self.inner.process_keyevent(event) {
            Some(DecodedKey::Unicode(c)) => {
                if self.ctrl && (c == 'l' || c == 'L') {
                    return KeyAction::ClearAndReplay;
                }
                match c {
                    '\n' | '\r' => KeyAction::Char(b'\n'),
                    // Tab, NUL and other control characters are swallowed.
                    c if (' '..='~').contains(&c) => KeyAction::Char(c as u8),
                    _ => KeyAction::Nothing,
                }
            }
            _ => KeyAction::Nothing,
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Line editor
// ---------------------------------------------------------------------------

/// Maximum characters of one input line, newline excluded.
pub const LINE_CAPACITY: usize = 128;

/// What the caller must render after feeding a character to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// Character accepted; echo it.
    Echo(u8),
    /// Buffer full; the character was dropped.
    Dropped,
    /// Newline: echo it, commit the pending line, then clear the editor.
    Commit,
}

/// The pending input line of one terminal.
pub struct LineEditor {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineEditor {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    /// Feed one printable character or newline. A newline always commits,
    /// even when the buffer already holds the full 128 characters.
    pub fn push_char(&mut self, c: u8) -> EditOp {
        if c == b'\n' {
            return EditOp::Commit;
        }
        if self.len < LINE_CAPACITY {
            self.buf[self.len] = c;
            self.len += 1;
            EditOp::Echo(c)
        } else {
            EditOp::Dropped
        }
    }

    /// Remove the last pending character. Returns whether one was removed.
    pub fn backspace(&mut self) -> bool {
        if self.len > 0 {
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// The pending line, newline excluded.
    pub fn line(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// IRQ plumbing (bare metal only)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod irq {
    use lazy_static::lazy_static;
    use spin::Mutex;

    use super::*;
    use crate::arch::x86::pic::{self, IRQ_KEYBOARD};
    use crate::arch::x86::port::inb;
    use crate::drivers::console;
    use crate::terminal;

    const STATUS_PORT: u16 = 0x64;
    const DATA_PORT: u16 = 0x60;
    /// Status bit: output buffer holds a byte.
    const OUTPUT_FULL: u8 = 0x01;

    struct KeyboardState {
        decoder: Decoder,
        editors: [LineEditor; TERMINAL_COUNT],
    }

    lazy_static! {
        static ref KEYBOARD: Mutex<KeyboardState> = Mutex::new(KeyboardState {
            decoder: Decoder::new(),
            editors: [const { LineEditor::new() }; TERMINAL_COUNT],
        });
    }

    /// Register the IRQ handler and unmask the keyboard line.
    pub fn init() {
        crate::arch::x86::irq::register(IRQ_KEYBOARD, handle_irq);
        pic::unmask(IRQ_KEYBOARD);
        log::info!("keyboard: scancode set 1, US layout");
    }

    /// Keyboard interrupt handler. Runs with interrupts disabled; terminal
    /// switching relies on that.
    fn handle_irq() {
        // SAFETY: Controller status/data port reads; the status bit gates
        // the data read per the 8042 protocol.
        let code = unsafe {
            if inb(STATUS_PORT) & OUTPUT_FULL == 0 {
                pic::eoi(IRQ_KEYBOARD);
                return;
            }
            inb(DATA_PORT)
        };

        let action = KEYBOARD.lock().decoder.handle_scancode(code);
        apply(action);
        pic::eoi(IRQ_KEYBOARD);
    }

    /// Apply a decoded action against the visible terminal.
    fn apply(action: KeyAction) {
        let visible = terminal::visible();
        match action {
            KeyAction::Nothing => {}
            KeyAction::SwitchTerminal(t) => terminal::switch_to(t),
            KeyAction::Char(c) => {
                let mut state = KEYBOARD.lock();
                match state.editors[visible].push_char(c) {
                    EditOp::Echo(c) => {
                        console::with(|console| console.put_char_visible(c));
                    }
                    EditOp::Commit => {
                        console::with(|console| console.put_char_visible(b'\n'));
                        let editor = &mut state.editors[visible];
                        if terminal::commit_line(visible, editor.line()).is_err() {
                            log::warn!("terminal {}: read queue full, line dropped", visible);
                        }
                        editor.clear();
                    }
                    EditOp::Dropped => {}
                }
            }
            KeyAction::Backspace => {
                let mut state = KEYBOARD.lock();
                if state.editors[visible].backspace() {
                    console::with(|console| console.backspace_visible());
                }
            }
            KeyAction::ClearAndReplay => {
                console::with(|console| console.clear_visible());
                crate::print_visible!("{}", terminal::SHELL_PROMPT);
                let state = KEYBOARD.lock();
                console::with(|console| {
                    for &c in state.editors[visible].line() {
                        console.put_char_visible(c);
                    }
                });
            }
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use irq::init;

#[cfg(test)]
mod tests {
    use super::*;

    // Set-1 make codes used below.
    const SC_A: u8 = 0x1E;
    const SC_L: u8 = 0x26;
    const SC_ENTER: u8 = 0x1C;
    const SC_BACKSPACE: u8 = 0x0E;
    const SC_TAB: u8 = 0x0F;
    const SC_LSHIFT: u8 = 0x2A;
    const SC_LCTRL: u8 = 0x1D;
    const SC_LALT: u8 = 0x38;
    const SC_CAPS: u8 = 0x3A;
    const SC_F2: u8 = 0x3C;
    const RELEASE: u8 = 0x80;

    #[test]
    fn plain_and_shifted_letters() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.handle_scancode(SC_A), KeyAction::Char(b'a'));
        assert_eq!(decoder.handle_scancode(SC_A | RELEASE), KeyAction::Nothing);

        assert_eq!(decoder.handle_scancode(SC_LSHIFT), KeyAction::Nothing);
        assert_eq!(decoder.handle_scancode(SC_A), KeyAction::Char(b'A'));
        assert_eq!(decoder.handle_scancode(SC_LSHIFT | RELEASE), KeyAction::Nothing);
        assert_eq!(decoder.handle_scancode(SC_A), KeyAction::Char(b'a'));
    }

    #[test]
    fn caps_lock_toggles_on_press_only() {
        let mut decoder = Decoder::new();
        decoder.handle_scancode(SC_CAPS);
        decoder.handle_scancode(SC_CAPS | RELEASE);
        assert_eq!(decoder.handle_scancode(SC_A), KeyAction::Char(b'A'));

        // Caps + shift gives the lowercase letter back.
        decoder.handle_scancode(SC_LSHIFT);
        assert_eq!(decoder.handle_scancode(SC_A), KeyAction::Char(b'a'));
        decoder.handle_scancode(SC_LSHIFT | RELEASE);

        decoder.handle_scancode(SC_CAPS);
        decoder.handle_scancode(SC_CAPS | RELEASE);
        assert_eq!(decoder.handle_scancode(SC_A), KeyAction::Char(b'a'));
    }

    #[test]
    fn alt_function_keys_switch_terminals() {
        let mut decoder = Decoder::new();
        // F2 without Alt is swallowed.
        assert_eq!(decoder.handle_scancode(SC_F2), KeyAction::Nothing);

        decoder.handle_scancode(SC_LALT);
        assert_eq!(decoder.handle_scancode(SC_F2), KeyAction::SwitchTerminal(1));
        decoder.handle_scancode(SC_LALT | RELEASE);
        assert_eq!(decoder.handle_scancode(SC_F2), KeyAction::Nothing);
    }

    #[test]
    fn ctrl_l_requests_clear_and_replay() {
        let mut decoder = Decoder::new();
        decoder.handle_scancode(SC_LCTRL);
        assert_eq!(decoder.handle_scancode(SC_L), KeyAction::ClearAndReplay);
        decoder.handle_scancode(SC_LCTRL | RELEASE);
        assert_eq!(decoder.handle_scancode(SC_L), KeyAction::Char(b'l'));
    }

    #[test]
    fn enter_backspace_and_tab() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.handle_scancode(SC_ENTER), KeyAction::Char(b'\n'));
        assert_eq!(decoder.handle_scancode(SC_BACKSPACE), KeyAction::Backspace);
        assert_eq!(
            decoder.handle_scancode(SC_BACKSPACE | RELEASE),
            KeyAction::Nothing
        );
        assert_eq!(decoder.handle_scancode(SC_TAB), KeyAction::Nothing);
    }

    #[test]
    fn editor_appends_until_full_and_always_commits_newline() {
        let mut editor = LineEditor::new();
        for i in 0..LINE_CAPACITY {
            assert_eq!(
                editor.push_char(b'a' + (i % 26) as u8),
                EditOp::Echo(b'a' + (i % 26) as u8)
            );
        }
        // Full buffer: printable characters are dropped...
        assert_eq!(editor.push_char(b'z'), EditOp::Dropped);
        assert_eq!(editor.line().len(), LINE_CAPACITY);
        // ...but a newline still commits the 128-character line.
        assert_eq!(editor.push_char(b'\n'), EditOp::Commit);
    }

    #[test]
    fn editor_backspace() {
        let mut editor = LineEditor::new();
        assert!(!editor.backspace());
        editor.push_char(b'h');
        editor.push_char(b'i');
        assert!(editor.backspace());
        assert_eq!(editor.line(), b"h");
        editor.clear();
        assert_eq!(editor.line(), b"");
    }
}

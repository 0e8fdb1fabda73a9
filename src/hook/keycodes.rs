//! macOS virtual key code translation
//!
//! Maps CGEvent key codes onto the crate's key token family, and decodes
//! which modifier a FlagsChanged event refers to. Left/right modifiers are
//! distinguished via the IOKit NX_DEVICE* device flags.

// Left/Right device flags (IOKit NX_DEVICE*KEYMASK constants)
const NX_DEVICELCTLKEYMASK: u64 = 0x0000_0001;
const NX_DEVICELSHIFTKEYMASK: u64 = 0x0000_0002;
const NX_DEVICERSHIFTKEYMASK: u64 = 0x0000_0004;
const NX_DEVICELCMDKEYMASK: u64 = 0x0000_0008;
const NX_DEVICERCMDKEYMASK: u64 = 0x0000_0010;
const NX_DEVICELALTKEYMASK: u64 = 0x0000_0020;
const NX_DEVICERALTKEYMASK: u64 = 0x0000_0040;
const NX_DEVICERCTLKEYMASK: u64 = 0x0000_2000;

const CG_EVENT_FLAG_MASK_ALPHA_SHIFT: u64 = 0x0001_0000;
const CG_EVENT_FLAG_MASK_SECONDARY_FN: u64 = 0x0080_0000;

/// Decode a FlagsChanged event into (key token, now pressed).
///
/// Returns `None` for flag changes this crate does not track.
pub(super) fn modifier_transition(key_code: u32, flags: u64) -> Option<(&'static str, bool)> {
    let (token, mask) = match key_code {
        56 => ("LShift", NX_DEVICELSHIFTKEYMASK),
        60 => ("RShift", NX_DEVICERSHIFTKEYMASK),
        59 => ("LControl", NX_DEVICELCTLKEYMASK),
        62 => ("RControl", NX_DEVICERCTLKEYMASK),
        58 => ("LAlt", NX_DEVICELALTKEYMASK),
        61 => ("RAlt", NX_DEVICERALTKEYMASK),
        55 => ("LMeta", NX_DEVICELCMDKEYMASK),
        54 => ("RMeta", NX_DEVICERCMDKEYMASK),
        57 => ("CapsLock", CG_EVENT_FLAG_MASK_ALPHA_SHIFT),
        // 63 is the traditional fn key, 179 the Globe key on newer Macs
        63 | 179 => ("Function", CG_EVENT_FLAG_MASK_SECONDARY_FN),
        _ => return None,
    };
    Some((token, (flags & mask) != 0))
}

/// Translate a macOS virtual key code into a key token.
///
/// Unknown codes get a deterministic `Key(<code>)` token so they still
/// track press/release consistently.
pub(super) fn keycode_to_name(key_code: u32) -> String {
    let token = match key_code {
        // Letters
        0 => "A",
        1 => "S",
        2 => "D",
        3 => "F",
        4 => "H",
        5 => "G",
        6 => "Z",
        7 => "X",
        8 => "C",
        9 => "V",
        11 => "B",
        12 => "Q",
        13 => "W",
        14 => "E",
        15 => "R",
        16 => "Y",
        17 => "T",
        31 => "O",
        32 => "U",
        34 => "I",
        35 => "P",
        37 => "L",
        38 => "J",
        40 => "K",
        45 => "N",
        46 => "M",

        // Number row
        18 => "Key1",
        19 => "Key2",
        20 => "Key3",
        21 => "Key4",
        23 => "Key5",
        22 => "Key6",
        26 => "Key7",
        28 => "Key8",
        25 => "Key9",
        29 => "Key0",

        // Punctuation
        24 => "Equal",
        27 => "Minus",
        30 => "RightBracket",
        33 => "LeftBracket",
        39 => "Apostrophe",
        41 => "Semicolon",
        42 => "BackSlash",
        43 => "Comma",
        44 => "Slash",
        47 => "Dot",
        50 => "Grave",

        // Whitespace and editing
        36 => "Enter",
        48 => "Tab",
        49 => "Space",
        51 => "Backspace",
        53 => "Escape",
        117 => "Delete",

        // Modifiers (normally arrive via FlagsChanged, mapped here too so
        // the token stays identical regardless of delivery path)
        54 => "RMeta",
        55 => "LMeta",
        56 => "LShift",
        57 => "CapsLock",
        58 => "LAlt",
        59 => "LControl",
        60 => "RShift",
        61 => "RAlt",
        62 => "RControl",
        63 | 179 => "Function",

        // Function keys
        122 => "F1",
        120 => "F2",
        99 => "F3",
        118 => "F4",
        96 => "F5",
        97 => "F6",
        98 => "F7",
        100 => "F8",
        101 => "F9",
        109 => "F10",
        103 => "F11",
        111 => "F12",
        105 => "F13",
        107 => "F14",
        113 => "F15",
        106 => "F16",
        64 => "F17",
        79 => "F18",
        80 => "F19",

        // Navigation
        123 => "Left",
        124 => "Right",
        125 => "Down",
        126 => "Up",
        115 => "Home",
        119 => "End",
        116 => "PageUp",
        121 => "PageDown",

        // Numpad
        65 => "NumpadDecimal",
        67 => "NumpadMultiply",
        69 => "NumpadAdd",
        71 => "NumpadClear",
        75 => "NumpadDivide",
        76 => "NumpadEnter",
        78 => "NumpadSubtract",
        81 => "NumpadEquals",
        82 => "Numpad0",
        83 => "Numpad1",
        84 => "Numpad2",
        85 => "Numpad3",
        86 => "Numpad4",
        87 => "Numpad5",
        88 => "Numpad6",
        89 => "Numpad7",
        91 => "Numpad8",
        92 => "Numpad9",

        _ => return format!("Key({key_code})"),
    };
    token.to_string()
}

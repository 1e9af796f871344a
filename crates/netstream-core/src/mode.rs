//! Open-mode capability tables.
//!
//! A stream's readable/writable flags are a fixed function of the mode its
//! handle was opened with. The mode string is normalized by dropping the
//! `b`, `t` and `e` modifiers and the remainder is looked up in two constant
//! tables; nothing is inferred from the characters themselves.

use netstream_fd::AccessMode;
use std::fs::OpenOptions;

/// Modes that permit reading.
pub const READ_MODES: &[&str] = &["r", "r+", "w+", "a+", "x+", "c+"];

/// Modes that permit writing.
pub const WRITE_MODES: &[&str] = &["r+", "w", "w+", "a", "a+", "x", "x+", "c", "c+"];

/// Every base mode a file may be opened with.
pub const OPEN_MODES: &[&str] = &["r", "r+", "w", "w+", "a", "a+", "x", "x+", "c", "c+"];

const MODIFIERS: &[char] = &['b', 't', 'e'];

/// Read/write capability derived from an open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub readable: bool,
    pub writable: bool,
}

/// Strip modifier characters, keeping the base mode and its `+`.
pub fn normalize(mode: &str) -> String {
    mode.chars().filter(|c| !MODIFIERS.contains(c)).collect()
}

/// Classify `mode` against the read and write tables.
pub fn capabilities(mode: &str) -> Capabilities {
    let base = normalize(mode);
    Capabilities {
        readable: READ_MODES.contains(&base.as_str()),
        writable: WRITE_MODES.contains(&base.as_str()),
    }
}

/// A mode is valid for opening a file when its normalized form is a base
/// mode and it carries no characters besides the modifiers.
pub fn is_valid_open_mode(mode: &str) -> bool {
    OPEN_MODES.contains(&normalize(mode).as_str())
}

/// Translate an open mode into the equivalent `OpenOptions`.
///
/// | mode | read | write | create | truncate | exclusive | append |
/// |------|------|-------|--------|----------|-----------|--------|
/// | r    | yes  |       |        |          |           |        |
/// | w    |      | yes   | yes    | yes      |           |        |
/// | a    |      | yes   | yes    |          |           | yes    |
/// | x    |      | yes   | yes    |          | yes       |        |
/// | c    |      | yes   | yes    |          |           |        |
///
/// A trailing `+` adds the missing direction.
pub fn open_options(mode: &str) -> Option<OpenOptions> {
    let base = normalize(mode);
    if !OPEN_MODES.contains(&base.as_str()) {
        return None;
    }
    let plus = base.ends_with('+');
    let mut options = OpenOptions::new();
    match base.chars().next() {
        Some('r') => {
            options.read(true).write(plus);
        }
        Some('w') => {
            options.write(true).read(plus).create(true).truncate(true);
        }
        Some('a') => {
            options.append(true).read(plus).create(true);
        }
        Some('x') => {
            options.write(true).read(plus).create_new(true);
        }
        Some('c') => {
            options.write(true).read(plus).create(true);
        }
        _ => return None,
    }
    Some(options)
}

/// Reconstruct an open mode for a descriptor that was adopted without one.
pub fn from_access_mode(access: AccessMode) -> &'static str {
    match (access.read, access.write, access.append) {
        (true, true, true) => "a+",
        (true, true, false) => "r+",
        (false, true, true) => "a",
        (false, true, false) => "w",
        _ => "r",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_table() {
        for mode in ["r", "r+", "w+", "a+", "x+", "c+"] {
            assert!(capabilities(mode).readable, "{mode} should be readable");
        }
        for mode in ["w", "a", "x", "c"] {
            assert!(!capabilities(mode).readable, "{mode} should not be readable");
        }
    }

    #[test]
    fn write_table() {
        for mode in ["r+", "w", "w+", "a", "a+", "x", "x+", "c", "c+"] {
            assert!(capabilities(mode).writable, "{mode} should be writable");
        }
        assert!(!capabilities("r").writable);
    }

    #[test]
    fn modifiers_are_ignored() {
        assert_eq!(capabilities("rb"), capabilities("r"));
        assert_eq!(capabilities("r+b"), capabilities("r+"));
        assert_eq!(capabilities("rb+"), capabilities("r+"));
        assert_eq!(capabilities("w+e"), capabilities("w+"));
        assert_eq!(capabilities("wt"), capabilities("w"));
    }

    #[test]
    fn unknown_modes_have_no_capability() {
        assert_eq!(capabilities(""), Capabilities::default());
        assert_eq!(capabilities("q"), Capabilities::default());
        assert_eq!(capabilities("rw"), Capabilities::default());
    }

    #[test]
    fn open_mode_validation() {
        assert!(is_valid_open_mode("r"));
        assert!(is_valid_open_mode("c+b"));
        assert!(!is_valid_open_mode("e"));
        assert!(!is_valid_open_mode("z"));
        assert!(!is_valid_open_mode("r++"));
        assert!(open_options("z").is_none());
        assert!(open_options("w+").is_some());
    }

    #[test]
    fn access_mode_roundtrips_through_tables() {
        let rw = AccessMode {
            read: true,
            write: true,
            ..AccessMode::default()
        };
        assert_eq!(from_access_mode(rw), "r+");
        let ro = AccessMode {
            read: true,
            ..AccessMode::default()
        };
        assert_eq!(from_access_mode(ro), "r");
        let append = AccessMode {
            write: true,
            append: true,
            ..AccessMode::default()
        };
        assert_eq!(from_access_mode(append), "a");
        assert_eq!(
            capabilities(from_access_mode(rw)),
            Capabilities {
                readable: true,
                writable: true
            }
        );
    }

    #[test]
    fn open_options_honour_plus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"data").unwrap();

        // r cannot write
        let file = open_options("r").unwrap().open(&path).unwrap();
        let mut read_only = file;
        assert!(std::io::Write::write(&mut read_only, b"x").is_err());

        // x refuses an existing file
        assert!(open_options("x").unwrap().open(&path).is_err());

        // w truncates
        drop(open_options("w").unwrap().open(&path).unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}

//! Operator command grammar for the serial console.
//!
//! Lines arrive already assembled and newline-stripped; this module only
//! recognizes them. Anything unrecognized is ignored by the caller, per the
//! console contract. Keywords are case-sensitive.

/// Parsed operator commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Drive the converter's TEST input (internal test signal path).
    TestMode(bool),
    /// Select a measurement range. Validated against the table at dispatch.
    Range(u8),
    /// Emit counters, buffer fill, range parameters and the running average.
    Status,
    /// Enumerate all range profiles.
    Ranges,
    /// Clear the averaging buffer, keeping the active range.
    Reset,
}

/// Recognize one console line. `None` means "silently ignore".
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();

    // Bare keywords first, so `ranges` never falls into the `range <n>` arm.
    match line {
        "status" => return Some(Command::Status),
        "ranges" => return Some(Command::Ranges),
        "reset" => return Some(Command::Reset),
        _ => {}
    }

    if let Some(rest) = line.strip_prefix("test") {
        return match rest.trim() {
            "on" => Some(Command::TestMode(true)),
            "off" => Some(Command::TestMode(false)),
            _ => None,
        };
    }

    if let Some(rest) = line.strip_prefix("range") {
        return rest.trim().parse::<u8>().ok().map(Command::Range);
    }

    None
}

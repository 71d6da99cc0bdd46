//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `lmatch` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                        |
//! |------|----------------------------------------------------------------|
//! | 0    | Every entry matched                                            |
//! | 1    | Reconciliation ran; unmatched entries remain                   |
//! | 2    | Usage error (bad arguments, unsupported file type)             |
//! | 3    | Invalid configuration                                          |
//! | 4    | Invalid input (column missing, empty, parse, too large, unreadable) |
//! | 5    | Internal consistency defect                                    |
//! | 6    | File I/O (cannot read input, cannot write report)              |

use ledgermatch_recon::ReconError;

/// Success - every ERP and bank entry was paired.
pub const EXIT_SUCCESS: u8 = 0;

/// Unmatched entries present. Like `diff(1)`, 1 means "sources differ."
pub const EXIT_UNMATCHED: u8 = 1;

/// Usage error - bad arguments, unsupported extension.
pub const EXIT_USAGE: u8 = 2;

/// Config file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Source data rejected: missing column, no rows, unparseable value,
/// too many rows or bytes, undecodable file.
pub const EXIT_INVALID_INPUT: u8 = 4;

/// Engine invariant violated. Always a bug.
pub const EXIT_INTERNAL: u8 = 5;

/// Cannot read an input file or write an output file.
pub const EXIT_IO: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    if err.is_config() {
        EXIT_INVALID_CONFIG
    } else if err.is_defect() {
        EXIT_INTERNAL
    } else {
        EXIT_INVALID_INPUT
    }
}

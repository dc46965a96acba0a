//! Process exit codes
//!
//! These follow Unix conventions and sysexits.h where applicable.

/// Every pipeline wrote its output, or failures are only reported
pub const SUCCESS: i32 = 0;

/// Unspecified failure
pub const ERROR: i32 = 1;

/// Settings file could not be parsed or is inconsistent
pub const CONFIG_ERROR: i32 = 2;

/// At least one pipeline failed under the `fail` policy
pub const PIPELINE_FAILED: i32 = 3;

/// File not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Invalid arguments or options (sysexits.h `EX_USAGE`)
pub const USAGE_ERROR: i32 = 64;

/// Application name, used for temp and log file naming.
pub const APP_NAME: &str = "php-build";

/// Exit status used when a definition cannot be found.
pub const DEFINITION_NOT_FOUND_EXIT: i32 = 127;

/// Number of log lines shown to the user when a build fails.
pub const LOG_TAIL_LINES: usize = 10;

/// php.ini variant used when none is selected.
pub const DEFAULT_INI_ENV: &str = "development";

/// Marks a source-control revision in an extension spec (`redis=@abcdef`).
pub const REVISION_MARKER: char = '@';

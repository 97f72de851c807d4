//! Every vendor message literal the classifier and reporter match against.
//!
//! FlexLM diagnostics are versioned prose, matched by substring; keeping all
//! of the literals in one table is the only defense against silent drift
//! when a vendor release rewords a message.

#![allow(missing_docs)]

// ---------------------------------------------------------------------------
// lmstat stdout markers
// ---------------------------------------------------------------------------

pub const NOT_RUNNING: &str = "lmgrd is not running";
pub const SERVER_UP_MASTER: &str = "license server UP (MASTER)";
pub const VENDOR_UP: &str = "MLM: UP";
pub const VENDOR_NO_SOCKET: &str = "MLM: No socket connection to license server manager.";
/// Transient right after start/stop; benign when paired with the settle
/// delay, so it is recognized and deliberately ignored.
pub const TRANSIENT_READ_FAILURE: &str = "Cannot read data from license server system. (-16,287)";

// ---------------------------------------------------------------------------
// Debug-log signatures (classifier, tail-20)
// ---------------------------------------------------------------------------

pub const PORT_OPEN_FAILED: &str = "Failed to open the TCP port number in the license.";
pub const INVALID_HOSTNAME: &str = "Not a valid server hostname, exiting.";
pub const UNKNOWN_HOSTNAME: &str = "Unknown Hostname: ";
pub const HOSTNAME_NOT_IN_DATABASE: &str =
    "license file is not available in the local network database";
pub const MISSING_DAEMON_LINE: &str = "(There are no VENDOR (or DAEMON) lines in the license file)";
pub const PORT_IN_USE_PREFIX: &str = "((lmgrd) The TCP port number in the license, ";
pub const PORT_IN_USE_SUFFIX: &str = ", is already in use.";
pub const RETRYING_FIVE_MINUTES: &str = "Retrying for about 5 more minutes";
pub const LISTENER_RUNNING: &str = "(MLM) Listener Thread: running";
pub const EXITING_SIGNAL_15: &str = "(lmgrd) EXITING DUE TO SIGNAL 15";
pub const VENDOR_SHUTDOWN_REQUESTED: &str = "(MLM) daemon shutdown requested - shutting down";
pub const VENDOR_EXIT_STATUS_36: &str = "MLM exited with status 36 (No features to serve)";
pub const VENDOR_EXIT_STATUS_27: &str = "MLM exited with status 27 (No features to serve)";
pub const VENDOR_EXIT_CORRUPT: &str = "(lmgrd) MLM exited with status 2 signal = 17";
/// MLM fell back to the compiled-in default license path.
pub const VENDOR_DEFAULT_LICENSE: &str =
    "Cannot open license file /usr/local/flexlm/licenses/license.dat";
pub const REDO_LMDOWN_FORCE: &str = "(lmgrd) Redo lmdown with '-force' arg.";
pub const LICENSES_BORROWED: &str =
    "(lmgrd) Cannot lmdown the server when licenses are borrowed. (-120,567";
pub const INVALID_LICENSE_SYNTAX: &str =
    "license manager: can't initialize:Invalid license file syntax.";

// ---------------------------------------------------------------------------
// Debug-log signatures (usage reporter)
// ---------------------------------------------------------------------------

pub const INVALID_AUTH_KEY: &str = "Invalid license key (inconsistent authentication code)";
pub const INCLUDE_COUNT_PREFIX: &str = "Number of INCLUDE names (";
pub const INCLUDE_COUNT_SUFFIX: &str = ") exceeds limit of";
pub const OPTIONS_FILE_CANNOT_OPEN: &str = "(MLM) CANNOT OPEN options file";
/// MLM logs a self-referential options-file complaint about the license
/// file itself; that one is noise, not a misconfiguration.
pub const OPTIONS_FILE_SELF_REFERENCE: &str = "options file \"License\"";
pub const NNU_NOTE: &str = "(MLM) NOTE: Some features are USER_BASED or HOST_BASED";

/// Expiry marker for a specific product.
#[must_use]
pub fn expired_marker(product: &str) -> String {
    format!("EXPIRED: {product}")
}

/// INCREMENT line naming a specific product (follows [`INVALID_AUTH_KEY`]).
#[must_use]
pub fn increment_marker(product: &str) -> String {
    format!("==>INCREMENT {product}")
}

/// USER_BASED failure: INCLUDE list missing entirely.
#[must_use]
pub fn include_missing_marker(product: &str) -> String {
    format!("(MLM) USER_BASED license error for {product} (INCLUDE missing)")
}

/// USER_BASED failure prefix whose follow-up line reports an INCLUDE list
/// exceeding the seat limit.
#[must_use]
pub fn include_overflow_marker(product: &str) -> String {
    format!("(MLM) USER_BASED license error for {product} --")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_nonempty_and_distinct() {
        let all = [
            NOT_RUNNING,
            SERVER_UP_MASTER,
            VENDOR_UP,
            VENDOR_NO_SOCKET,
            TRANSIENT_READ_FAILURE,
            PORT_OPEN_FAILED,
            INVALID_HOSTNAME,
            UNKNOWN_HOSTNAME,
            HOSTNAME_NOT_IN_DATABASE,
            MISSING_DAEMON_LINE,
            PORT_IN_USE_PREFIX,
            PORT_IN_USE_SUFFIX,
            RETRYING_FIVE_MINUTES,
            LISTENER_RUNNING,
            EXITING_SIGNAL_15,
            VENDOR_SHUTDOWN_REQUESTED,
            VENDOR_EXIT_STATUS_36,
            VENDOR_EXIT_STATUS_27,
            VENDOR_EXIT_CORRUPT,
            VENDOR_DEFAULT_LICENSE,
            REDO_LMDOWN_FORCE,
            LICENSES_BORROWED,
            INVALID_LICENSE_SYNTAX,
            INVALID_AUTH_KEY,
            INCLUDE_COUNT_PREFIX,
            INCLUDE_COUNT_SUFFIX,
            OPTIONS_FILE_CANNOT_OPEN,
            OPTIONS_FILE_SELF_REFERENCE,
            NNU_NOTE,
        ];
        let unique: std::collections::HashSet<&&str> = all.iter().collect();
        assert_eq!(all.len(), unique.len());
        assert!(all.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn vendor_up_marker_does_not_match_no_socket_line() {
        // "MLM: UP" must never be a substring of the down-marker, or the
        // classifier's up/partial split breaks.
        assert!(!VENDOR_NO_SOCKET.contains(VENDOR_UP));
    }

    #[test]
    fn per_product_markers_embed_the_product() {
        assert_eq!(expired_marker("MATLAB"), "EXPIRED: MATLAB");
        assert_eq!(increment_marker("MATLAB"), "==>INCREMENT MATLAB");
        assert!(include_missing_marker("MATLAB").contains("(INCLUDE missing)"));
        assert!(include_overflow_marker("MATLAB").ends_with("MATLAB --"));
    }
}

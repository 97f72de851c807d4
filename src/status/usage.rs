//! Seat-usage and per-product error reporting from lmstat output.
//!
//! Everything here is advisory: a reporting failure degrades to "seat info
//! unavailable" and never disturbs the up/down classification that was
//! already made.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::status::patterns;

static USAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Users of ([\w\-\.]+):\s+\(Total of (\d+) license[s]? issued;\s+Total of (\d+) license[s]? in use\)",
    )
    .unwrap()
});

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Users of ([\w\-\.]+):\s+\(Error: (\d+) license[s]?, unsupported by licensed server\)")
        .unwrap()
});

static NODE_LOCKED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Users of ([\w\-\.]+):\s+\(Uncounted, node-locked\)").unwrap());

/// Seat counts for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatUsage {
    pub product: String,
    pub total: u64,
    pub in_use: u64,
}

impl SeatUsage {
    /// "N/M seat(s) in use" — singular only at exactly one issued seat.
    #[must_use]
    pub fn render(&self) -> String {
        let noun = if self.total == 1 { "seat" } else { "seats" };
        format!(
            "{}: {}/{} {noun} in use.",
            self.product, self.in_use, self.total
        )
    }
}

/// A product the server refuses to serve, with the best root cause found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductError {
    pub product: String,
    pub diagnosis: String,
}

/// Full advisory report for an `Up` server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageReport {
    pub seats: Vec<SeatUsage>,
    pub errors: Vec<ProductError>,
    /// Node-locked products; atypical on a server, flagged as likely
    /// misconfiguration.
    pub node_locked: Vec<String>,
    pub warnings: Vec<String>,
}

impl UsageReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
            && self.errors.is_empty()
            && self.node_locked.is_empty()
            && self.warnings.is_empty()
    }

    /// Human-readable lines, errors first, seat counts last.
    #[must_use]
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for error in &self.errors {
            lines.push(error.diagnosis.clone());
        }
        for warning in &self.warnings {
            lines.push(warning.clone());
        }
        for product in &self.node_locked {
            lines.push(format!(
                "The product {product} is from a node-locked license, which is atypical on a license server."
            ));
        }
        for seat in &self.seats {
            lines.push(seat.render());
        }
        lines
    }
}

/// Build the report from lmstat stdout plus the resolved log.
///
/// `log_lines` is the full log (root-cause scans need history); the
/// options-file check only looks at the last 50 lines, matching how far
/// back that complaint stays relevant.
#[must_use]
pub fn report(stdout: &str, log_lines: &[String]) -> UsageReport {
    let tail_50_start = log_lines.len().saturating_sub(50);
    let last_50 = &log_lines[tail_50_start..];

    let mut report = UsageReport::default();

    for caps in ERROR_RE.captures_iter(stdout) {
        let product = caps[1].to_string();
        let diagnosis = diagnose_product_error(&product, log_lines);
        report.errors.push(ProductError { product, diagnosis });
    }

    if last_50
        .iter()
        .any(|line| line.contains(patterns::OPTIONS_FILE_CANNOT_OPEN))
        && !last_50
            .iter()
            .any(|line| line.contains(patterns::OPTIONS_FILE_SELF_REFERENCE))
    {
        report.warnings.push(
            "Your options file could not be opened. Make sure the path to it in your license file is correct."
                .to_string(),
        );
    }

    if log_lines.iter().any(|line| line.contains(patterns::NNU_NOTE)) {
        report.warnings.push(
            "Warning: your license file contains at least 1 NNU license. Products on an NNU \
             license will seemingly have their seat count halved/doubled since each user \
             specified gets 2 seats per product."
                .to_string(),
        );
    }

    for caps in NODE_LOCKED_RE.captures_iter(stdout) {
        report.node_locked.push(caps[1].to_string());
    }

    for caps in USAGE_RE.captures_iter(stdout) {
        // The regex groups are all-digit, so the parses cannot fail.
        let total = caps[2].parse().unwrap_or(0);
        let in_use = caps[3].parse().unwrap_or(0);
        report.seats.push(SeatUsage {
            product: caps[1].to_string(),
            total,
            in_use,
        });
    }

    report
}

/// Scan the full log for why a product is unserviceable. Checks are ordered
/// from most to least specific; first hit wins.
fn diagnose_product_error(product: &str, log_lines: &[String]) -> String {
    let expired = patterns::expired_marker(product);
    let increment = patterns::increment_marker(product);
    let include_missing = patterns::include_missing_marker(product);
    let include_overflow = patterns::include_overflow_marker(product);

    for (i, line) in log_lines.iter().enumerate() {
        if line.contains(&expired) {
            return format!("{product} is expired and cannot be used.");
        }
        if line.contains(patterns::INVALID_AUTH_KEY)
            && log_lines
                .get(i + 1)
                .is_some_and(|next| next.contains(&increment))
        {
            return format!(
                "{product} has an invalid authentication key and needs its license file to be regenerated."
            );
        }
        if line.contains(&include_missing) {
            return format!(
                "{product} is from an NNU license and does not have a valid INCLUDE setup. \
                 Therefore, it cannot be used."
            );
        }
        if line.contains(&include_overflow)
            && log_lines.get(i + 1).is_some_and(|next| {
                next.contains(patterns::INCLUDE_COUNT_PREFIX)
                    && next.contains(patterns::INCLUDE_COUNT_SUFFIX)
            })
        {
            return format!(
                "{product} has too many users included from the options file and therefore, cannot be used."
            );
        }
    }

    format!("{product}: an error is preventing this product from being used.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_seat_usage_lines() {
        let stdout = "Users of MATLAB:  (Total of 10 licenses issued;  Total of 3 licenses in use)\n\
                      Users of Simulink:  (Total of 1 license issued;  Total of 1 license in use)\n";
        let report = report(stdout, &[]);
        assert_eq!(
            report.seats,
            vec![
                SeatUsage {
                    product: "MATLAB".to_string(),
                    total: 10,
                    in_use: 3
                },
                SeatUsage {
                    product: "Simulink".to_string(),
                    total: 1,
                    in_use: 1
                },
            ]
        );
    }

    #[test]
    fn pluralization_is_singular_only_at_exactly_one_total() {
        let one = SeatUsage {
            product: "A".to_string(),
            total: 1,
            in_use: 0,
        };
        assert_eq!(one.render(), "A: 0/1 seat in use.");

        let zero = SeatUsage {
            product: "B".to_string(),
            total: 0,
            in_use: 0,
        };
        assert_eq!(zero.render(), "B: 0/0 seats in use.");

        let many = SeatUsage {
            product: "C".to_string(),
            total: 2,
            in_use: 1,
        };
        assert_eq!(many.render(), "C: 1/2 seats in use.");
    }

    #[test]
    fn product_names_allow_dots_and_dashes() {
        let stdout =
            "Users of MATLAB_Distrib-Comp.Engine:  (Total of 4 licenses issued;  Total of 0 licenses in use)\n";
        let report = report(stdout, &[]);
        assert_eq!(report.seats[0].product, "MATLAB_Distrib-Comp.Engine");
    }

    #[test]
    fn expired_product_gets_expiry_diagnosis() {
        let stdout = "Users of MATLAB:  (Error: 10 licenses, unsupported by licensed server)\n";
        let log = lines(&["something", "EXPIRED: MATLAB", "more"]);
        let report = report(stdout, &log);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].diagnosis.contains("expired"));
    }

    #[test]
    fn auth_key_diagnosis_requires_adjacent_increment_line() {
        let stdout = "Users of MATLAB:  (Error: 10 licenses, unsupported by licensed server)\n";

        let adjacent = lines(&[
            "Invalid license key (inconsistent authentication code)",
            "==>INCREMENT MATLAB MLM 40 ...",
        ]);
        assert!(
            report(stdout, &adjacent).errors[0]
                .diagnosis
                .contains("invalid authentication key")
        );

        // Same two lines, but not adjacent: falls through to generic.
        let separated = lines(&[
            "Invalid license key (inconsistent authentication code)",
            "unrelated line",
            "==>INCREMENT MATLAB MLM 40 ...",
        ]);
        assert!(
            report(stdout, &separated).errors[0]
                .diagnosis
                .contains("an error is preventing")
        );
    }

    #[test]
    fn include_missing_and_overflow_diagnoses() {
        let stdout = "Users of MATLAB:  (Error: 2 licenses, unsupported by licensed server)\n";

        let missing = lines(&["(MLM) USER_BASED license error for MATLAB (INCLUDE missing)"]);
        assert!(
            report(stdout, &missing).errors[0]
                .diagnosis
                .contains("does not have a valid INCLUDE setup")
        );

        let overflow = lines(&[
            "(MLM) USER_BASED license error for MATLAB --",
            "Number of INCLUDE names (12) exceeds limit of 10.",
        ]);
        assert!(
            report(stdout, &overflow).errors[0]
                .diagnosis
                .contains("too many users included")
        );
    }

    #[test]
    fn root_cause_order_prefers_expiry() {
        let stdout = "Users of MATLAB:  (Error: 2 licenses, unsupported by licensed server)\n";
        let log = lines(&[
            "EXPIRED: MATLAB",
            "(MLM) USER_BASED license error for MATLAB (INCLUDE missing)",
        ]);
        assert!(report(stdout, &log).errors[0].diagnosis.contains("expired"));
    }

    #[test]
    fn error_for_one_product_does_not_leak_to_another() {
        let stdout = "Users of MATLAB:  (Error: 2 licenses, unsupported by licensed server)\n";
        let log = lines(&["EXPIRED: Simulink"]);
        assert!(
            report(stdout, &log).errors[0]
                .diagnosis
                .contains("an error is preventing")
        );
    }

    #[test]
    fn options_file_warning_skips_benign_self_reference() {
        let stdout = "";
        let complaining = lines(&["(MLM) CANNOT OPEN options file \"/opt/opts\""]);
        assert_eq!(report(stdout, &complaining).warnings.len(), 1);

        let benign = lines(&[
            "(MLM) CANNOT OPEN options file \"License\"",
            "options file \"License\" unreadable",
        ]);
        assert!(report(stdout, &benign).warnings.is_empty());
    }

    #[test]
    fn options_file_scan_is_limited_to_last_fifty_lines() {
        let mut log = vec!["(MLM) CANNOT OPEN options file \"/opt/opts\"".to_string()];
        log.extend((0..60).map(|i| format!("filler {i}")));
        assert!(report("", &log).warnings.is_empty());
    }

    #[test]
    fn nnu_note_scans_the_full_log() {
        let mut log = vec!["(MLM) NOTE: Some features are USER_BASED or HOST_BASED".to_string()];
        log.extend((0..60).map(|i| format!("filler {i}")));
        let report = report("", &log);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("NNU"));
    }

    #[test]
    fn node_locked_products_are_flagged() {
        let stdout = "Users of PolySpace:  (Uncounted, node-locked)\n";
        let report = report(stdout, &[]);
        assert_eq!(report.node_locked, vec!["PolySpace".to_string()]);
        let rendered = report.render_lines();
        assert!(rendered[0].contains("node-locked"));
    }

    #[test]
    fn empty_inputs_produce_empty_report() {
        assert!(report("", &[]).is_empty());
    }
}

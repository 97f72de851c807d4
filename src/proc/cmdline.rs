//! Command-line parsing for lmgrd invocations.
//!
//! Two source formats reach us: `/proc/<pid>/cmdline` (NUL-separated argv)
//! and plain command-line strings (service image paths, `ps`/`wmic` output)
//! where paths may be double-quoted. Both carry the debug-log location as a
//! `-l` flag whose value may start with `+` (lmgrd's append marker).

/// Extract the `-l` log-path value from an lmgrd command line.
///
/// Accepts either format; NUL bytes switch to argv mode. The leading `+` and
/// surrounding quotes are stripped. Returns `None` when no standalone `-l`
/// flag with a usable value is present.
#[must_use]
pub fn extract_log_flag(command_line: &str) -> Option<String> {
    if command_line.trim().is_empty() {
        return None;
    }

    if command_line.contains('\0') {
        let args: Vec<&str> = command_line.split('\0').filter(|s| !s.is_empty()).collect();
        return extract_log_flag_argv(&args);
    }

    extract_log_flag_quoted(command_line)
}

/// Argv-mode extraction: the value is the argument after a literal `-l`.
#[must_use]
pub fn extract_log_flag_argv(args: &[&str]) -> Option<String> {
    for window in args.windows(2) {
        if window[0] == "-l" {
            let value = window[1].trim_start_matches('+').trim_matches('"');
            if !value.trim().is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// String-mode extraction: find a standalone `-l` token, then take the
/// following quoted or space-delimited value.
fn extract_log_flag_quoted(command_line: &str) -> Option<String> {
    let bytes = command_line.as_bytes();
    let mut index = 0;
    while let Some(found) = command_line[index..].find("-l") {
        let at = index + found;

        // "-l" must be its own token, not a slice of "-local" or "C:\-logs".
        let valid_start = at == 0 || bytes[at - 1].is_ascii_whitespace();
        let valid_end = at + 2 < bytes.len() && bytes[at + 2].is_ascii_whitespace();

        if valid_start && valid_end {
            let mut rest = command_line[at + 2..].trim_start();
            if rest.is_empty() {
                return None;
            }
            rest = rest.strip_prefix('+').unwrap_or(rest);

            if let Some(quoted) = rest.strip_prefix('"') {
                if let Some(end) = quoted.find('"')
                    && end > 0
                {
                    return Some(quoted[..end].to_string());
                }
            } else {
                let value = rest.split(' ').next().unwrap_or(rest);
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }

        index = at + 2;
    }
    None
}

/// Extract the executable path from a service image path or command line.
///
/// A quoted prefix wins; otherwise everything up to the first space. Image
/// paths of unquoted executables with spaces in them are ambiguous and the
/// first-space rule matches how the service manager itself resolves them.
#[must_use]
pub fn extract_executable(image_path: &str) -> Option<String> {
    let trimmed = image_path.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix('"') {
        if let Some(end) = rest.find('"')
            && end > 0
        {
            return Some(rest[..end].to_string());
        }
    }

    match trimmed.find(' ') {
        Some(pos) if pos > 0 => Some(trimmed[..pos].to_string()),
        _ => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_log_flag() {
        assert_eq!(
            extract_log_flag("lmgrd -c /opt/license.dat -l /var/log/lmlog.txt"),
            Some("/var/log/lmlog.txt".to_string())
        );
    }

    #[test]
    fn strips_append_marker() {
        assert_eq!(
            extract_log_flag("lmgrd -c lic.dat -l +/var/log/lmlog.txt"),
            Some("/var/log/lmlog.txt".to_string())
        );
    }

    #[test]
    fn extracts_quoted_value_with_spaces() {
        assert_eq!(
            extract_log_flag(r#"lmgrd -c "C:\FlexLM\lic.dat" -l +"C:\Log Files\lmlog.txt""#),
            Some(r"C:\Log Files\lmlog.txt".to_string())
        );
    }

    #[test]
    fn ignores_embedded_dash_l() {
        // "-local" and paths containing "-l" must not match.
        assert_eq!(extract_log_flag("lmgrd -local -c lic.dat"), None);
        assert_eq!(extract_log_flag(r"lmgrd -c C:\x-log\lic.dat"), None);
    }

    #[test]
    fn skips_false_match_then_finds_real_flag() {
        assert_eq!(
            extract_log_flag("lmgrd -longflag value -l /tmp/log.txt"),
            Some("/tmp/log.txt".to_string())
        );
    }

    #[test]
    fn handles_nul_separated_argv() {
        assert_eq!(
            extract_log_flag("lmgrd\0-c\0/opt/lic.dat\0-l\0+/var/log/lmlog.txt\0"),
            Some("/var/log/lmlog.txt".to_string())
        );
    }

    #[test]
    fn nul_argv_without_flag_yields_none() {
        assert_eq!(extract_log_flag("lmgrd\0-c\0/opt/lic.dat\0"), None);
    }

    #[test]
    fn trailing_flag_without_value_yields_none() {
        assert_eq!(extract_log_flag("lmgrd -c lic.dat -l"), None);
        assert_eq!(extract_log_flag("lmgrd\0-c\0lic.dat\0-l\0"), None);
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(extract_log_flag(""), None);
        assert_eq!(extract_log_flag("   "), None);
    }

    #[test]
    fn extracts_quoted_executable() {
        assert_eq!(
            extract_executable(r#""C:\Program Files\FlexLM\lmgrd.exe" -z -c lic.dat"#),
            Some(r"C:\Program Files\FlexLM\lmgrd.exe".to_string())
        );
    }

    #[test]
    fn extracts_unquoted_executable_up_to_first_space() {
        assert_eq!(
            extract_executable(r"C:\FlexLM\lmgrd.exe -z -c lic.dat"),
            Some(r"C:\FlexLM\lmgrd.exe".to_string())
        );
    }

    #[test]
    fn bare_executable_passes_through() {
        assert_eq!(
            extract_executable("/opt/flexlm/lmgrd"),
            Some("/opt/flexlm/lmgrd".to_string())
        );
        assert_eq!(extract_executable("  "), None);
    }
}

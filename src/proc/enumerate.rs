//! Finding running `lmgrd` processes and their command lines.
//!
//! One strategy per OS: `/proc` on Linux, `ps` on macOS, `wmic` on Windows.
//! Enumeration feeds a best-effort heuristic (log-path discovery), so every
//! failure mode degrades to "no processes found" rather than an error.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::platform::pal::HostOs;

/// Command lines of running `lmgrd` processes, in the raw format of the
/// source (NUL-separated on Linux, plain strings elsewhere).
#[must_use]
pub fn lmgrd_command_lines(os: HostOs) -> Vec<String> {
    match os {
        HostOs::Linux => scan_proc(Path::new("/proc")),
        HostOs::MacOs => scan_ps(),
        HostOs::Windows => scan_wmic(),
    }
}

/// Walk `/proc/<pid>/` entries and keep cmdlines whose argv[0] names lmgrd.
fn scan_proc(proc_root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(proc_root) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(cmdline) = fs::read_to_string(entry.path().join("cmdline")) else {
            continue;
        };
        if is_lmgrd_cmdline(&cmdline) {
            found.push(cmdline);
        }
    }
    found
}

fn scan_ps() -> Vec<String> {
    let Ok(output) = Command::new("ps").args(["-axo", "args="]).output() else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }
    filter_ps_lines(&String::from_utf8_lossy(&output.stdout))
}

fn scan_wmic() -> Vec<String> {
    let Ok(output) = Command::new("wmic")
        .args([
            "process",
            "where",
            "name='lmgrd.exe'",
            "get",
            "CommandLine",
            "/value",
        ])
        .output()
    else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }
    parse_wmic_output(&String::from_utf8_lossy(&output.stdout))
}

/// True when argv[0]'s basename is an lmgrd binary.
fn is_lmgrd_cmdline(cmdline: &str) -> bool {
    let argv0 = cmdline.split(['\0', ' ']).next().unwrap_or("");
    let basename = argv0.rsplit(['/', '\\']).next().unwrap_or(argv0);
    basename.eq_ignore_ascii_case("lmgrd") || basename.eq_ignore_ascii_case("lmgrd.exe")
}

fn filter_ps_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && is_lmgrd_cmdline(line))
        .map(ToString::to_string)
        .collect()
}

/// Pull `CommandLine=` values out of `wmic /value` output.
fn parse_wmic_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let value = trimmed
                .strip_prefix("CommandLine=")
                .or_else(|| trimmed.strip_prefix("commandline="))?;
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_lmgrd_argv0_variants() {
        assert!(is_lmgrd_cmdline("/opt/flexlm/lmgrd\0-c\0/opt/lic.dat\0"));
        assert!(is_lmgrd_cmdline("lmgrd -c lic.dat"));
        assert!(is_lmgrd_cmdline(r"C:\FlexLM\LMGRD.EXE -z -c lic.dat"));
        assert!(!is_lmgrd_cmdline("/usr/bin/lmutil lmstat -a"));
        assert!(!is_lmgrd_cmdline("/opt/lmgrd-helper/run"));
        assert!(!is_lmgrd_cmdline(""));
    }

    #[test]
    fn filters_ps_output_to_lmgrd_lines() {
        let stdout = "/sbin/launchd\n\
                      /opt/flexlm/lmgrd -c /opt/lic.dat -l /var/log/lmlog.txt\n\
                      ps -axo args=\n";
        let lines = filter_ps_lines(stdout);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("/opt/flexlm/lmgrd"));
    }

    #[test]
    fn parses_wmic_value_format() {
        let stdout = "\r\n\r\nCommandLine=\"C:\\FlexLM\\lmgrd.exe\" -z -c lic.dat\r\n\r\n\
                      CommandLine=\r\n\r\n";
        let lines = parse_wmic_output(stdout);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("lmgrd.exe"));
    }

    #[test]
    fn proc_scan_of_empty_dir_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_proc(dir.path()).is_empty());
        assert!(scan_proc(Path::new("/nonexistent-proc")).is_empty());
    }

    #[test]
    fn proc_scan_picks_up_numeric_entries() {
        let dir = tempfile::tempdir().unwrap();
        let pid_dir = dir.path().join("4242");
        std::fs::create_dir(&pid_dir).unwrap();
        std::fs::write(
            pid_dir.join("cmdline"),
            b"/opt/flexlm/lmgrd\0-c\0/opt/lic.dat\0-l\0/tmp/lmlog.txt\0",
        )
        .unwrap();

        let other_dir = dir.path().join("4243");
        std::fs::create_dir(&other_dir).unwrap();
        std::fs::write(other_dir.join("cmdline"), b"/usr/bin/top\0").unwrap();

        let found = scan_proc(dir.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("lmgrd"));
    }
}

//! Common utilities shared by the CLI and the scenario runner

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Last non-empty lines of captured process output, for compact error detail
pub fn tail_lines(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines_skips_blank_lines() {
        let out = "one\n\ntwo\n  \nthree\n";
        assert_eq!(tail_lines(out, 2), "two\nthree");
        assert_eq!(tail_lines(out, 10), "one\ntwo\nthree");
        assert_eq!(tail_lines("", 3), "");
    }
}

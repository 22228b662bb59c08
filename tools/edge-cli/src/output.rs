//! Output formatting for the CLI.

use console::{style, Term};

/// Output handler for CLI messages.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
    term: Term,
}

impl Output {
    /// Create a new output handler writing to stdout.
    pub fn new(verbose: bool, json: bool) -> Self {
        Self {
            verbose,
            json,
            term: Term::stdout(),
        }
    }

    /// Same settings, writing to stderr. Used when stdout carries data.
    pub fn on_stderr(&self) -> Self {
        Self {
            term: Term::stderr(),
            ..self.clone()
        }
    }

    fn line(&self, line: &str) {
        let _ = self.term.write_line(line);
    }

    /// Print a success message.
    pub fn success(&self, msg: &str) {
        if self.json {
            return;
        }
        self.line(&format!("{} {}", style("✓").green(), msg));
    }

    /// Print a warning message.
    pub fn warn(&self, msg: &str) {
        if self.json {
            return;
        }
        eprintln!("{} {}", style("⚠").yellow(), msg);
    }

    /// Print an error message.
    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
            return;
        }
        eprintln!("{} {}", style("✗").red(), style(msg).red());
    }

    /// Print a debug message (only in verbose mode).
    pub fn debug(&self, msg: &str) {
        if !self.verbose || self.json {
            return;
        }
        eprintln!("{} {}", style("→").dim(), style(msg).dim());
    }

    /// Print a header/title.
    pub fn header(&self, msg: &str) {
        if self.json {
            return;
        }
        self.line(&format!("\n{}", style(msg).bold().underlined()));
    }

    /// Print preformatted text.
    pub fn text(&self, text: &str) {
        if self.json {
            return;
        }
        for line in text.lines() {
            self.line(line);
        }
    }

    /// Print a section name such as `[server]`.
    pub fn section(&self, name: &str) {
        if self.json {
            return;
        }
        self.line("");
        self.line(&format!("[{}]", style(name).cyan()));
    }

    /// Print JSON output.
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            self.line(&json);
        }
    }

    /// Print a key-value pair.
    pub fn kv(&self, key: &str, value: &str) {
        if self.json {
            return;
        }
        self.line(&format!("  {}: {}", style(key).dim(), value));
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.json
    }
}

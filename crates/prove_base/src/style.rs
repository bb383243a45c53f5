//! ANSI terminal color styling for diagnostic rendering.
//!
//! Thin escape-code wrappers with an explicit plain mode, so tests and
//! non-TTY output get byte-stable text.

/// ANSI styling with an on/off switch.
#[derive(Clone, Copy)]
pub struct Style {
    enabled: bool,
}

impl Style {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const RED: &'static str = "\x1b[31m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const BLUE: &'static str = "\x1b[34m";
    pub const CYAN: &'static str = "\x1b[36m";

    /// Colored output.
    pub fn colored() -> Self {
        Self { enabled: true }
    }

    /// Plain output: every styling call returns its input unchanged.
    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn wrap(&self, codes: &str, s: &str) -> String {
        if self.enabled {
            format!("{}{}{}", codes, s, Self::RESET)
        } else {
            s.to_string()
        }
    }

    pub fn bold_red(&self, s: &str) -> String {
        self.wrap("\x1b[1m\x1b[31m", s)
    }

    pub fn bold_yellow(&self, s: &str) -> String {
        self.wrap("\x1b[1m\x1b[33m", s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.wrap(Self::BOLD, s)
    }

    pub fn blue(&self, s: &str) -> String {
        self.wrap(Self::BLUE, s)
    }

    pub fn cyan(&self, s: &str) -> String {
        self.wrap(Self::CYAN, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colored_wraps_string() {
        let out = Style::colored().bold_red("error");
        assert!(out.contains("\x1b[31m"));
        assert!(out.contains("error"));
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn plain_passes_through() {
        assert_eq!(Style::plain().bold_red("error"), "error");
        assert_eq!(Style::plain().cyan("try"), "try");
    }
}

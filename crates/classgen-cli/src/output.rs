//! Colored terminal output
//!
//! Uses `termcolor`; `NO_COLOR` overrides the `--color` flag.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from the `--color` flag and the environment
pub fn resolve_color_choice(flag: &str) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        "always" => ColorChoice::Always,
        "never" => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
        }
    }

    fn write_styled(&mut self, text: &str, spec: &ColorSpec) {
        let _ = self.stdout.set_color(spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Green bold text
    pub fn success(&mut self, text: &str) {
        self.write_styled(text, ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    }

    /// Red bold text
    pub fn error(&mut self, text: &str) {
        self.write_styled(text, ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    }

    /// Yellow bold text
    pub fn warning(&mut self, text: &str) {
        self.write_styled(text, ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    }

    pub fn dim(&mut self, text: &str) {
        self.write_styled(text, ColorSpec::new().set_fg(Some(Color::White)));
    }

    pub fn bold(&mut self, text: &str) {
        self.write_styled(text, ColorSpec::new().set_bold(true));
    }

    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    /// " PASS " badge
    pub fn pass_badge(&mut self) {
        self.write_styled(
            " PASS ",
            ColorSpec::new()
                .set_bg(Some(Color::Green))
                .set_fg(Some(Color::White))
                .set_bold(true),
        );
    }

    /// " FAIL " badge
    pub fn fail_badge(&mut self) {
        self.write_styled(
            " FAIL ",
            ColorSpec::new()
                .set_bg(Some(Color::Red))
                .set_fg(Some(Color::White))
                .set_bold(true),
        );
    }
}

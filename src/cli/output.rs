//! Colored terminal output for pipeline runs

use crate::pipeline::StageStatus;
use std::io::Write;
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Colored stdout/stderr printer honoring `--quiet` and `--verbose`
#[derive(Debug)]
pub struct OutputManager {
    stdout: BufferWriter,
    verbose: bool,
    quiet: bool,
}

impl Clone for OutputManager {
    fn clone(&self) -> Self {
        Self::new(self.verbose, self.quiet)
    }
}

impl OutputManager {
    /// Printer for the given verbosity
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            stdout: BufferWriter::stdout(ColorChoice::Auto),
            verbose,
            quiet,
        }
    }

    /// Green check line
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.marked("✓", Color::Green, message)
    }

    /// Yellow warning line
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.marked("⚠", Color::Yellow, message)
    }

    /// Detail line, shown with `--verbose` only
    pub fn verbose(&self, message: &str) -> std::io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        self.marked("→", Color::Blue, message)
    }

    /// Print one stage result line
    pub fn stage(
        &self,
        status: StageStatus,
        label: &str,
        detail: Option<&str>,
    ) -> std::io::Result<()> {
        let (symbol, color) = match status {
            StageStatus::Succeeded => ("✓", Color::Green),
            StageStatus::Failed => ("✗", Color::Red),
            StageStatus::Skipped => ("○", Color::Yellow),
        };
        let message = match detail {
            Some(detail) => format!("{:<24} {}", label, detail),
            None => label.to_string(),
        };
        self.marked(symbol, color, &message)
    }

    /// Red error line on stderr, printed even with `--quiet`
    pub fn error(&self, message: &str) {
        let stderr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = stderr.buffer();

        let written = write_marked(&mut buffer, "✗", Color::Red, message)
            .and_then(|()| stderr.print(&buffer));
        if written.is_err() {
            println!("✗ {}", message);
        }
    }

    /// Bold cyan heading preceded by a blank line
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut buffer = self.stdout.buffer();
        writeln!(&mut buffer)?;
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        writeln!(&mut buffer, "═══ {} ═══", title)?;
        buffer.reset()?;
        self.stdout.print(&buffer)
    }

    /// Plain line indented under the previous one
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.println(&format!("    {}", message))
    }

    /// Plain line
    pub fn println(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut buffer = self.stdout.buffer();
        writeln!(&mut buffer, "{}", message)?;
        self.stdout.print(&buffer)
    }

    /// `--verbose` was given
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// `--quiet` was given
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    fn marked(&self, symbol: &str, color: Color, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut buffer = self.stdout.buffer();
        write_marked(&mut buffer, symbol, color, message)?;
        self.stdout.print(&buffer)
    }
}

fn write_marked(
    buffer: &mut Buffer,
    symbol: &str,
    color: Color,
    message: &str,
) -> std::io::Result<()> {
    buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(buffer, "{}", symbol)?;
    buffer.reset()?;
    writeln!(buffer, " {}", message)
}

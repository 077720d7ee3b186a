//! Informational output sink
//!
//! The core reports progress and warnings through this port only; with
//! the silent reporter installed it stays quiet, which is also the
//! degraded behavior when no sink is wired up.

use console::Style;

/// Informational output port
pub trait Reporter {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn detail(&self, message: &str);
}

/// Styled terminal reporter
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        println!("{}", message);
    }

    fn warn(&self, message: &str) {
        println!("{} {}", Style::new().bold().yellow().apply_to("warning:"), message);
    }

    fn detail(&self, message: &str) {
        println!("  {}", Style::new().dim().apply_to(message));
    }
}

/// No-op reporter
#[derive(Debug, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn detail(&self, _message: &str) {}
}

//! Collection progress reporting.
//!
//! A run reports two things: the fraction of enabled sources finished
//! (`0.0..=1.0`, non-decreasing) and human-readable status messages
//! ("Collecting from reddit...", "Collected 1,234 items from reddit").
//! CLI reporters write to **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// Sink for a run's progress and status events.
///
/// Called from the orchestrator task, so implementations must not block
/// for long.
pub trait CollectionReporter: Send + Sync {
    fn on_progress(&self, fraction: f64);
    fn on_status(&self, message: &str);
}

/// Human-friendly progress on stderr: `collect  [######----]  60%`.
pub struct StderrProgress;

impl CollectionReporter for StderrProgress {
    fn on_progress(&self, fraction: f64) {
        let line = format!("collect  {}  {:>3}%\n", bar(fraction, 20), percent(fraction));
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }

    fn on_status(&self, message: &str) {
        let _ = writeln!(std::io::stderr().lock(), "collect  {}", message);
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl CollectionReporter for JsonProgress {
    fn on_progress(&self, fraction: f64) {
        emit_json(serde_json::json!({
            "event": "progress",
            "fraction": fraction,
        }));
    }

    fn on_status(&self, message: &str) {
        emit_json(serde_json::json!({
            "event": "status",
            "message": message,
        }));
    }
}

fn emit_json(obj: serde_json::Value) {
    if let Ok(line) = serde_json::to_string(&obj) {
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
        let _ = std::io::stderr().lock().flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl CollectionReporter for NoProgress {
    fn on_progress(&self, _fraction: f64) {}
    fn on_status(&self, _message: &str) {}
}

/// Adapts a pair of closures, for embedding callers that already have
/// their own event wiring.
pub struct FnReporter<P, S> {
    progress: P,
    status: S,
}

impl<P, S> FnReporter<P, S>
where
    P: Fn(f64) + Send + Sync,
    S: Fn(&str) + Send + Sync,
{
    pub fn new(progress: P, status: S) -> Self {
        Self { progress, status }
    }
}

impl<P, S> CollectionReporter for FnReporter<P, S>
where
    P: Fn(f64) + Send + Sync,
    S: Fn(&str) + Send + Sync,
{
    fn on_progress(&self, fraction: f64) {
        (self.progress)(fraction)
    }

    fn on_status(&self, message: &str) {
        (self.status)(message)
    }
}

fn percent(fraction: f64) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}

fn bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn CollectionReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn bar_and_percent() {
        assert_eq!(bar(0.0, 4), "[----]");
        assert_eq!(bar(0.5, 4), "[##--]");
        assert_eq!(bar(1.5, 4), "[####]");
        assert_eq!(percent(1.0 / 3.0), 33);
    }

    #[test]
    fn parse_modes() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::parse("loud"), None);
    }

    #[test]
    fn fn_reporter_forwards() {
        let seen = Mutex::new(Vec::new());
        let reporter = FnReporter::new(
            |f| seen.lock().unwrap().push(format!("{:.1}", f)),
            |m| seen.lock().unwrap().push(m.to_string()),
        );
        reporter.on_progress(0.5);
        reporter.on_status("done");
        assert_eq!(*seen.lock().unwrap(), vec!["0.5", "done"]);
    }
}

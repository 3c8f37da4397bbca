use anstyle::{AnsiColor, Style};
use is_terminal::IsTerminal;
use std::fmt::Display;
use std::io::{self, Write};
use std::time::{Duration, Instant};

const STATUS_WIDTH: usize = 12;

#[derive(Debug, Clone, Copy)]
enum StatusKind {
    Pending,
    Success,
    Info,
    Warn,
    Error,
}

impl StatusKind {
    fn to_stderr(self) -> bool {
        matches!(self, StatusKind::Warn | StatusKind::Error)
    }

    fn style(self) -> Style {
        let color = match self {
            StatusKind::Pending => AnsiColor::Cyan,
            StatusKind::Success => AnsiColor::Green,
            StatusKind::Info => AnsiColor::Blue,
            StatusKind::Warn => AnsiColor::Yellow,
            StatusKind::Error => AnsiColor::Red,
        };
        Style::new().bold().fg_color(Some(color.into()))
    }
}

fn supports_color(to_stderr: bool) -> bool {
    let tty = if to_stderr {
        io::stderr().is_terminal()
    } else {
        io::stdout().is_terminal()
    };
    tty && std::env::var_os("NO_COLOR").is_none()
}

fn write_status(kind: StatusKind, label: &str, message: &str) {
    let to_stderr = kind.to_stderr();
    let mut handle: Box<dyn Write> = if to_stderr {
        Box::new(io::stderr().lock())
    } else {
        Box::new(io::stdout().lock())
    };

    let (prefix, suffix) = if supports_color(to_stderr) {
        let style = kind.style();
        (style.render().to_string(), style.render_reset().to_string())
    } else {
        (String::new(), String::new())
    };

    let mut lines = message.split('\n');
    let first = lines.next().unwrap_or_default();
    let _ = writeln!(handle, "{prefix}{label:>STATUS_WIDTH$}{suffix} {first}");
    for line in lines {
        let _ = writeln!(handle, "{:>STATUS_WIDTH$} {line}", "");
    }
    let _ = handle.flush();
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 60 {
        format!("{}m {}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else if duration.as_secs_f64() >= 1.0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

pub fn status(label: &str, message: impl Display) {
    write_status(StatusKind::Pending, label, &message.to_string());
}

pub fn info(message: impl Display) {
    write_status(StatusKind::Info, "Info", &message.to_string());
}

pub fn warn(message: impl Display) {
    write_status(StatusKind::Warn, "Warning", &message.to_string());
}

pub fn error(message: impl Display) {
    write_status(StatusKind::Error, "Error", &message.to_string());
}

pub fn success(label: &str, message: impl Display) {
    write_status(StatusKind::Success, label, &message.to_string());
}

/// A long-running step reported once when it starts and once when it ends.
pub struct Progress {
    message: String,
    started: Instant,
    complete: bool,
}

impl Progress {
    pub fn new(label: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        write_status(StatusKind::Pending, label, &message);

        Self {
            message,
            started: Instant::now(),
            complete: false,
        }
    }

    pub fn success(mut self, label: &str, detail: impl Display) {
        self.complete = true;
        let elapsed = format_duration(self.started.elapsed());
        write_status(
            StatusKind::Success,
            label,
            &format!("{} {} in {}", self.message, detail, elapsed),
        );
    }

    pub fn fail(mut self, label: &str, error: impl Display) {
        self.complete = true;
        let elapsed = format_duration(self.started.elapsed());
        write_status(
            StatusKind::Error,
            label,
            &format!("{} after {}: {}", self.message, elapsed, error),
        );
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if !self.complete {
            write_status(StatusKind::Warn, "Cancelled", &format!("{} (aborted)", self.message));
        }
    }
}

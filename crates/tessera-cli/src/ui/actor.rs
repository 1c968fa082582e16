//! UI actor: one thread owns stdout.
//!
//! Releases are fetched, exported and uploaded concurrently, and each task
//! reports through [`ConsoleReporter`]. Events are queued on a channel and
//! printed in order by a single thread, so lines never interleave.

use std::sync::mpsc;
use std::thread;

use crossterm::style::Stylize;
use tessera_core::Reporter;

#[derive(Debug)]
pub enum UiEvent {
    Section(String),
    Downloading {
        name: String,
        version: String,
        current: u64,
        total: Option<u64>,
    },
    Uploading {
        name: String,
        version: String,
        target: String,
    },
    Removing {
        name: String,
        version: String,
    },
    Done {
        name: String,
        version: String,
        detail: String,
    },
    Failed {
        name: String,
        version: String,
        reason: String,
    },
    Info(String),
    Warning(String),
    Summary {
        count: usize,
        action: String,
        elapsed_secs: f64,
    },
    Shutdown,
}

/// [`Reporter`] printing to the terminal from a dedicated thread.
#[derive(Debug)]
pub struct ConsoleReporter {
    sender: mpsc::Sender<UiEvent>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ConsoleReporter {
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_event_loop(&receiver));
        Self {
            sender,
            handle: Some(handle),
        }
    }

    fn send(&self, event: UiEvent) {
        // The actor only stops on shutdown; late events are dropped.
        let _ = self.sender.send(event);
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        self.send(UiEvent::Section(title.to_string()));
    }

    fn downloading(&self, release: &str, version: &str, current: u64, total: Option<u64>) {
        self.send(UiEvent::Downloading {
            name: release.to_string(),
            version: version.to_string(),
            current,
            total,
        });
    }

    fn uploading(&self, release: &str, version: &str, target: &str) {
        self.send(UiEvent::Uploading {
            name: release.to_string(),
            version: version.to_string(),
            target: target.to_string(),
        });
    }

    fn removing(&self, release: &str, version: &str) {
        self.send(UiEvent::Removing {
            name: release.to_string(),
            version: version.to_string(),
        });
    }

    fn done(&self, release: &str, version: &str, detail: &str) {
        self.send(UiEvent::Done {
            name: release.to_string(),
            version: version.to_string(),
            detail: detail.to_string(),
        });
    }

    fn failed(&self, release: &str, version: &str, reason: &str) {
        self.send(UiEvent::Failed {
            name: release.to_string(),
            version: version.to_string(),
            reason: reason.to_string(),
        });
    }

    fn info(&self, msg: &str) {
        self.send(UiEvent::Info(msg.to_string()));
    }

    fn warning(&self, msg: &str) {
        self.send(UiEvent::Warning(msg.to_string()));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        self.send(UiEvent::Summary {
            count,
            action: action.to_string(),
            elapsed_secs,
        });
    }
}

const NAME_WIDTH: usize = 28;
const VERSION_WIDTH: usize = 14;

fn row(icon: &str, name: &str, version: &str) -> String {
    format!("  {icon} {name:<NAME_WIDTH$} {version:<VERSION_WIDTH$}")
}

/// Render one event. `None` for events with no output.
pub fn render(event: &UiEvent) -> Option<String> {
    let line = match event {
        UiEvent::Section(title) => format!("\n{}", title.as_str().bold()),
        UiEvent::Downloading {
            name,
            version,
            current,
            total,
        } => {
            let status = match total.filter(|t| *t > 0) {
                Some(total) => format!("fetching {}%", current.saturating_mul(100) / total),
                None => "fetching".to_string(),
            };
            format!("{} {}", row("↓", name, version), status.dark_grey())
        }
        UiEvent::Uploading {
            name,
            version,
            target,
        } => format!(
            "{} {}",
            row("↑", name, version),
            format!("uploading to {target}").dark_grey()
        ),
        UiEvent::Removing { name, version } => {
            format!("{} {}", row("-", name, version), "removing".dark_grey())
        }
        UiEvent::Done {
            name,
            version,
            detail,
        } => format!("{} {}", row(&"✓".green().to_string(), name, version), detail),
        UiEvent::Failed {
            name,
            version,
            reason,
        } => format!(
            "{} {}",
            row(&"✗".red().to_string(), name, version),
            reason.as_str().red()
        ),
        UiEvent::Info(msg) => format!("  {} {msg}", "ℹ".blue()),
        UiEvent::Warning(msg) => format!("  {} {}", "!".yellow().bold(), msg.as_str().yellow()),
        UiEvent::Summary {
            count,
            action,
            elapsed_secs,
        } => {
            let operation = action.to_uppercase();
            format!(
                "\n{}",
                format!("{operation} COMPLETE {count}, elapsed {elapsed_secs:.1}s")
                    .green()
                    .bold()
            )
        }
        UiEvent::Shutdown => return None,
    };
    Some(line)
}

fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>) {
    while let Ok(event) = receiver.recv() {
        if matches!(event, UiEvent::Shutdown) {
            break;
        }
        if let Some(line) = render(&event) {
            println!("{line}");
        }
        // JSON result line for CI
        if let UiEvent::Summary {
            count,
            action,
            elapsed_secs,
        } = &event
        {
            let result = serde_json::json!({
                "operation": action,
                "status": "success",
                "count": count,
                "elapsed": elapsed_secs,
            });
            println!(
                "RESULT {}",
                serde_json::to_string(&result).unwrap_or_default()
            );
        }
    }
}

//! Log collection service implementation
//!
//! [`LogCollectionService`] holds the set of currently installed
//! [`OutputWriter`]s. Its [`LogCollectionLayer`] is registered once with the
//! tracing subscriber and forwards every event to those writers. A run
//! installs its writers (run store, per-run log file) at start and the
//! returned [`InstalledWriter`] guard removes them again, so a writer never
//! outlives the run it belongs to.
//!
//! Writers are called synchronously from the thread that emitted the event.
//! A slow writer therefore slows down the emitter, which keeps memory usage
//! bounded when child processes produce output faster than it can be stored.

use crate::output::OutputWriter;
use crate::types::{LogEntry, LogLevel};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use ptp_perf_common::Result;
use std::cell::Cell;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

struct InstalledEntry {
    id: u64,
    min_level: LogLevel,
    writer: Mutex<Box<dyn OutputWriter>>,
}

#[derive(Default)]
struct Inner {
    writers: RwLock<Vec<Arc<InstalledEntry>>>,
    next_id: AtomicU64,
}

/// Registry of installed output writers.
#[derive(Clone, Default)]
pub struct LogCollectionService {
    inner: Arc<Inner>,
}

impl fmt::Debug for LogCollectionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogCollectionService")
            .field("writers", &self.installed_count())
            .finish()
    }
}

impl LogCollectionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tracing layer feeding this service.
    pub fn layer(&self) -> LogCollectionLayer {
        LogCollectionLayer {
            service: self.clone(),
        }
    }

    /// Installs a writer receiving every event.
    pub fn install(&self, writer: impl OutputWriter + 'static) -> InstalledWriter {
        self.install_with_level(writer, LogLevel::Debug)
    }

    /// Installs a writer receiving events at `min_level` or above.
    pub fn install_with_level(
        &self,
        writer: impl OutputWriter + 'static,
        min_level: LogLevel,
    ) -> InstalledWriter {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.writers.write().push(Arc::new(InstalledEntry {
            id,
            min_level,
            writer: Mutex::new(Box::new(writer)),
        }));
        InstalledWriter {
            service: self.clone(),
            id,
            active: true,
        }
    }

    pub fn installed_count(&self) -> usize {
        self.inner.writers.read().len()
    }

    /// Forwards an entry to every installed writer.
    pub fn dispatch(&self, entry: &LogEntry) {
        let writers: Vec<_> = self.inner.writers.read().clone();
        if writers.is_empty() {
            return;
        }

        // Events emitted while a writer runs would re-enter the writer lock.
        if DISPATCHING.with(|flag| flag.replace(true)) {
            return;
        }
        for installed in writers.iter().filter(|w| entry.level >= w.min_level) {
            if let Err(e) = installed.writer.lock().write(entry) {
                eprintln!("Failed to write log entry: {}", e);
            }
        }
        DISPATCHING.with(|flag| flag.set(false));
    }

    fn remove(&self, id: u64) -> Result<()> {
        let removed = {
            let mut writers = self.inner.writers.write();
            let position = writers.iter().position(|w| w.id == id);
            position.map(|index| writers.remove(index))
        };
        match removed {
            Some(installed) => installed.writer.lock().close(),
            None => Ok(()),
        }
    }
}

/// Guard returned by [`LogCollectionService::install`].
///
/// Dropping the guard uninstalls the writer; [`InstalledWriter::uninstall`]
/// does the same and reports the error of the final flush.
pub struct InstalledWriter {
    service: LogCollectionService,
    id: u64,
    active: bool,
}

impl InstalledWriter {
    pub fn uninstall(mut self) -> Result<()> {
        self.active = false;
        self.service.remove(self.id)
    }
}

impl Drop for InstalledWriter {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.service.remove(self.id) {
                eprintln!("Failed to close log writer: {}", e);
            }
        }
    }
}

/// Tracing layer forwarding events to a [`LogCollectionService`].
#[derive(Clone)]
pub struct LogCollectionLayer {
    service: LogCollectionService,
}

impl<S: Subscriber> Layer<S> for LogCollectionLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.service.installed_count() == 0 {
            return;
        }

        let metadata = event.metadata();
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let source = visitor.source.unwrap_or_else(|| {
            let target = metadata.target();
            target.rsplit("::").next().unwrap_or(target).to_string()
        });

        let entry = LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::from(metadata.level()),
            source,
            message: visitor.message + &visitor.fields,
        };
        self.service.dispatch(&entry);
    }
}

/// Collects the message, the `source` field and any remaining fields as
/// `key=value` suffixes.
#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: String,
    source: Option<String>,
}

impl EntryVisitor {
    fn record_value(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "source" => self.source = Some(value),
            name => {
                let _ = write!(self.fields, " {}={}", name, value);
            }
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CircularBufferOutputWriter;
    use tracing::{info, warn};
    use tracing_subscriber::layer::SubscriberExt;

    fn with_service<F: FnOnce(&LogCollectionService)>(f: F) {
        let service = LogCollectionService::new();
        let subscriber = tracing_subscriber::registry().with(service.layer());
        tracing::subscriber::with_default(subscriber, || f(&service));
    }

    #[test]
    fn test_source_field_and_message() {
        with_service(|service| {
            let buffer = CircularBufferOutputWriter::new(16);
            let _guard = service.install(buffer.clone());

            info!(source = "ptp4l", "| master offset {}", -12);

            let logs = buffer.get_logs();
            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].source, "ptp4l");
            assert_eq!(logs[0].message, "| master offset -12");
        });
    }

    #[test]
    fn test_target_is_default_source_and_fields_are_appended() {
        with_service(|service| {
            let buffer = CircularBufferOutputWriter::new(16);
            let _guard = service.install(buffer.clone());

            info!(target: "ptp_perf_engine::orchestrator", run_id = 7, "Run started");

            let logs = buffer.get_logs();
            assert_eq!(logs[0].source, "orchestrator");
            assert_eq!(logs[0].message, "Run started run_id=7");
        });
    }

    #[test]
    fn test_level_threshold_and_uninstall() {
        with_service(|service| {
            let all = CircularBufferOutputWriter::new(16);
            let warnings = CircularBufferOutputWriter::new(16);
            let all_guard = service.install(all.clone());
            let warn_guard = service.install_with_level(warnings.clone(), LogLevel::Warn);

            info!("informational");
            warn!("suspicious");
            assert_eq!(all.get_logs().len(), 2);
            assert_eq!(warnings.get_logs().len(), 1);

            warn_guard.uninstall().unwrap();
            drop(all_guard);
            assert_eq!(service.installed_count(), 0);

            warn!("after uninstall");
            assert_eq!(warnings.get_logs().len(), 1);
        });
    }
}

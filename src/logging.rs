//! # Routing of the crate's `tracing` output to the configured [`LogSink`].
//!
//! A supervisor runs under its own dispatcher: a `fmt` subscriber writing to
//! [`SupervisorConfig::log_sink`](crate::SupervisorConfig::log_sink), capped at
//! [`SupervisorConfig::log_level`](crate::SupervisorConfig::log_level). Tasks
//! spawned on its behalf (subscriber workers, bus listener, process reapers)
//! carry the same dispatcher, so `LogLevel::Off` silences all of it even when
//! the embedding binary installed a global subscriber.
//!
//! ```text
//! info!/warn!/LogWriter ──► Dispatch(fmt, max = log_level) ──► SinkWriter ──► LogSink
//! ```

use std::io;

use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::{LogLevel, LogSink};

/// Builds the dispatcher for one supervisor.
pub(crate) fn dispatch(sink: &LogSink, level: LogLevel) -> Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .finish();
    Dispatch::new(subscriber)
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            sink: self.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Collects one formatted record; appends it to the sink on drop.
pub struct SinkWriter {
    sink: LogSink,
    buf: Vec<u8>,
}

impl io::Write for SinkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            self.sink.append(&self.buf);
        }
    }
}

/// In-memory sink contents for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl Captured {
    pub(crate) fn sink(&self) -> LogSink {
        LogSink::new(self.clone())
    }

    pub(crate) fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[cfg(test)]
impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

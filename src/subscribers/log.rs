//! # LogWriter: event lines through `tracing`
//!
//! Turns every [`Event`] into one `tracing` record. The worker running it
//! carries the supervisor's dispatcher, so the lines land on the configured
//! log sink, capped at the configured log level.
//!
//! ## Example output
//! ```text
//!  INFO starting exec server templates=2
//! DEBUG template rendered, 1 of 2 templates reported (seen=1)
//!  INFO starting process pid=4242 generation=1 env=2
//!  INFO stopping process pid=4242 reason=restart
//!  INFO detected update, but not restarting process pid=4242
//!  INFO exec server received new token
//! ERROR template server error err="render failed: permission denied"
//!  INFO exec server stopped reason=shutdown
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::LogLevel;
use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    fn level_of(e: &Event) -> LogLevel {
        match e.kind {
            EventKind::EngineFailed | EventKind::EngineBuildFailed => LogLevel::Error,
            EventKind::SupervisorStopped if e.reason.as_deref() != Some("shutdown") => {
                LogLevel::Error
            }
            EventKind::ProcessExited => LogLevel::Warn,
            EventKind::RenderIncomplete | EventKind::RenderComplete | EventKind::TokenIgnored => {
                LogLevel::Debug
            }
            _ => LogLevel::Info,
        }
    }

    /// Formats an event without the level prefix.
    pub fn format(e: &Event) -> String {
        let reason = e.reason.as_deref().unwrap_or("unknown");
        let pid = e.pid.unwrap_or_default();
        match e.kind {
            EventKind::SupervisorStarting => {
                format!("starting exec server templates={}", e.count.unwrap_or_default())
            }
            EventKind::NothingToSupervise => "no env templates or exec config, exiting".to_string(),
            EventKind::ShutdownRequested => "shutdown requested".to_string(),
            EventKind::SupervisorStopped => format!("exec server stopped reason={reason}"),
            EventKind::TokenRotated => "exec server received new token".to_string(),
            EventKind::TokenIgnored => "token unchanged, ignoring".to_string(),
            EventKind::EngineStarted => {
                format!("template server started templates={}", e.count.unwrap_or_default())
            }
            EventKind::EngineStopped => format!("template server stopped reason={reason}"),
            EventKind::EngineFailed => format!("template server error err={reason:?}"),
            EventKind::EngineBuildFailed => {
                format!("template server failed to create err={reason:?}")
            }
            EventKind::RenderIncomplete => format!(
                "template rendered, {reason} (seen={})",
                e.count.unwrap_or_default()
            ),
            EventKind::RenderComplete => format!(
                "done rendering templates/detected change, bouncing process env={}",
                e.count.unwrap_or_default()
            ),
            EventKind::ProcessStarted => format!(
                "starting process pid={pid} generation={} env={}",
                e.generation.unwrap_or_default(),
                e.count.unwrap_or_default()
            ),
            EventKind::ProcessStopping => format!("stopping process pid={pid} reason={reason}"),
            EventKind::ProcessRestartSkipped => {
                format!("detected update, but not restarting process pid={pid}")
            }
            EventKind::ProcessExited => format!(
                "process exited code={} generation={}",
                e.exit_code.unwrap_or_default(),
                e.generation.unwrap_or_default()
            ),
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let line = Self::format(e);
        match Self::level_of(e) {
            LogLevel::Error => error!("{line}"),
            LogLevel::Warn => warn!("{line}"),
            LogLevel::Info => info!("{line}"),
            LogLevel::Debug | LogLevel::Trace => debug!("{line}"),
            LogLevel::Off => {}
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use tracing::instrument::WithSubscriber;

    use super::*;
    use crate::logging::{Captured, dispatch};

    async fn write_all(level: LogLevel, events: &[Event]) -> String {
        let out = Captured::default();
        let dispatch = dispatch(&out.sink(), level);
        async {
            for e in events {
                LogWriter.on_event(e).await;
            }
        }
        .with_subscriber(dispatch)
        .await;
        out.text()
    }

    #[tokio::test]
    async fn writes_lines_at_or_above_level() {
        let text = write_all(
            LogLevel::Info,
            &[
                Event::new(EventKind::ProcessStarted)
                    .with_pid(7)
                    .with_generation(1)
                    .with_count(2),
                Event::new(EventKind::RenderIncomplete).with_count(1),
                Event::new(EventKind::EngineFailed).with_reason("denied"),
            ],
        )
        .await;

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2, "{text}");
        assert!(lines[0].ends_with(" INFO starting process pid=7 generation=1 env=2"));
        assert!(lines[1].ends_with("ERROR template server error err=\"denied\""));
    }

    #[tokio::test]
    async fn failed_supervision_is_an_error_line() {
        let text = write_all(
            LogLevel::Error,
            &[
                Event::new(EventKind::SupervisorStopped).with_reason("shutdown"),
                Event::new(EventKind::SupervisorStopped).with_reason("process exited with code 3"),
            ],
        )
        .await;
        assert_eq!(
            text.lines().collect::<Vec<_>>().len(),
            1,
            "{text}"
        );
        assert!(text.contains("exec server stopped reason=process exited with code 3"));
    }

    #[tokio::test]
    async fn off_writes_nothing() {
        let text = write_all(
            LogLevel::Off,
            &[Event::new(EventKind::EngineBuildFailed).with_reason("x")],
        )
        .await;
        assert!(text.is_empty());
    }
}

//! Error types used by the execvisor runtime.
//!
//! This module defines the error enums produced while supervising:
//!
//! - [`SupervisorError`]: returned by [`Supervisor::run`](crate::Supervisor::run); ends supervision.
//! - [`ConfigError`]: invalid agent/exec/template configuration.
//! - [`EngineError`]: failures of the rendering engine (construction or runtime).
//! - [`ProcessError`]: failures of the process-spawning primitive.
//! - [`BounceError`]: a failed attempt to (re)start the child process.
//! - [`StateError`]: a child-process state transition outside the allowed table.
//!
//! All types provide `as_label` for logs/metrics.

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::core::ChildProcessState;

/// # Errors that end [`Supervisor::run`](crate::Supervisor::run).
///
/// [`SupervisorError::ProcessExited`] is not a failure of the supervisor itself:
/// it reports that the supervised child ended on its own.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The child process exited without being asked to.
    #[error("process exited with {code}")]
    ProcessExited {
        /// OS exit code (`-1` when terminated by a signal).
        code: i32,
    },

    /// Configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The rendering engine could not be constructed.
    #[error("template server failed to create: {0}")]
    EngineBuild(#[source] EngineError),

    /// The rendering engine failed and retries are disabled.
    #[error("template server: {0}")]
    Engine(#[source] EngineError),

    /// Restarting the child process failed.
    #[error("unable to bounce command: {0}")]
    Bounce(#[from] BounceError),
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use execvisor::SupervisorError;
    ///
    /// let err = SupervisorError::ProcessExited { code: 3 };
    /// assert_eq!(err.as_label(), "process_exited");
    /// assert_eq!(err.exit_code(), Some(3));
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::ProcessExited { .. } => "process_exited",
            SupervisorError::Config(_) => "config_invalid",
            SupervisorError::EngineBuild(_) => "engine_build_failed",
            SupervisorError::Engine(_) => "engine_failed",
            SupervisorError::Bounce(_) => "bounce_failed",
        }
    }

    /// Exit code of the child when it ended supervision by exiting on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SupervisorError::ProcessExited { code } => Some(*code),
            _ => None,
        }
    }
}

/// # Invalid configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `restart_on_secret_changes` is neither `always` nor `never`.
    #[error("invalid value for restart-on-secret-changes: {0:?}")]
    InvalidRestartPolicy(String),

    /// The exec command line is empty.
    #[error("invalid command: no executable given")]
    EmptyCommand,

    /// A template has neither inline contents nor a source file.
    #[error("template #{index} must specify contents or source")]
    MissingTemplateSource {
        /// Position of the template in the configured list.
        index: usize,
    },

    /// A template does not name the environment variable it renders into.
    #[error("template #{index} must specify an environment variable")]
    MissingEnvVar {
        /// Position of the template in the configured list.
        index: usize,
    },

    /// The environment variable name cannot be used in an assignment.
    #[error("invalid environment variable name {name:?}")]
    InvalidEnvVar {
        /// Offending name.
        name: String,
    },

    /// A signal name could not be parsed.
    #[error("unknown signal {0:?}")]
    UnknownSignal(String),

    /// A log level name could not be parsed.
    #[error("unknown log level {0:?}")]
    UnknownLogLevel(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidRestartPolicy(_) => "config_invalid_restart_policy",
            ConfigError::EmptyCommand => "config_empty_command",
            ConfigError::MissingTemplateSource { .. } => "config_missing_template_source",
            ConfigError::MissingEnvVar { .. } => "config_missing_env_var",
            ConfigError::InvalidEnvVar { .. } => "config_invalid_env_var",
            ConfigError::UnknownSignal(_) => "config_unknown_signal",
            ConfigError::UnknownLogLevel(_) => "config_unknown_log_level",
        }
    }
}

/// # Rendering engine failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine could not be created from its configuration.
    #[error("build failed: {0}")]
    Build(String),

    /// The running engine reported an error (fetching, rendering, auth).
    #[error("render failed: {0}")]
    Render(String),
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::Build(_) => "engine_build",
            EngineError::Render(_) => "engine_render",
        }
    }
}

/// # Process-spawning failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The OS refused to start the process.
    #[error("error starting child process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The process started but no PID could be obtained.
    #[error("child process has no pid")]
    NoPid,

    /// Delivering a signal to the process failed.
    #[error("failed to send {signal} to {pid}: {errno}")]
    Signal {
        /// Target pid (negative for a process group).
        pid: i32,
        /// Signal that could not be delivered.
        signal: Signal,
        /// OS error.
        errno: nix::errno::Errno,
    },
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Spawn(_) => "process_spawn",
            ProcessError::NoPid => "process_no_pid",
            ProcessError::Signal { .. } => "process_signal",
        }
    }
}

/// # Child-process state transition outside the allowed table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid child process transition {from:?} -> {to:?}")]
pub struct StateError {
    /// State before the rejected transition.
    pub from: ChildProcessState,
    /// Requested state.
    pub to: ChildProcessState,
}

/// # A failed bounce of the child process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BounceError {
    /// Restart policy or command line is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The new process could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The lifecycle was asked for a transition it does not allow.
    #[error(transparent)]
    State(#[from] StateError),
}

impl BounceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BounceError::Config(e) => e.as_label(),
            BounceError::Process(e) => e.as_label(),
            BounceError::State(_) => "bounce_invalid_state",
        }
    }
}

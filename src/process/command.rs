//! Command-line preparation.
//!
//! ```text
//! ["./app --port 8080"]      → sh -c "./app --port 8080"   (subshell, own process group)
//! ["./app", "--port", "80"]  → ./app --port 80
//! ["./app"]                  → ./app
//! []                         → ConfigError::EmptyCommand
//! ```

use crate::error::ConfigError;

/// Executable, arguments, and whether a shell was interposed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub subshell: bool,
}

/// Turns the configured command line into an executable and its arguments.
///
/// A single element containing whitespace is run through `sh -c` so shell
/// features keep working.
pub fn command_prep(command: &[String]) -> Result<PreparedCommand, ConfigError> {
    match command {
        [] => Err(ConfigError::EmptyCommand),
        [single] => match single.split_whitespace().count() {
            0 => Err(ConfigError::EmptyCommand),
            1 => Ok(PreparedCommand {
                program: single.trim().to_string(),
                args: Vec::new(),
                subshell: false,
            }),
            _ => Ok(PreparedCommand {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), single.clone()],
                subshell: true,
            }),
        },
        [program, args @ ..] => Ok(PreparedCommand {
            program: program.clone(),
            args: args.to_vec(),
            subshell: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn shell_string_runs_in_subshell() {
        let got = command_prep(&cmd(&["./app --port 8080 | tee log"])).unwrap();
        assert_eq!(got.program, "sh");
        assert_eq!(got.args, cmd(&["-c", "./app --port 8080 | tee log"]));
        assert!(got.subshell);
    }

    #[test]
    fn argv_is_used_verbatim() {
        let got = command_prep(&cmd(&["./app", "--name", "two words"])).unwrap();
        assert_eq!(got.program, "./app");
        assert_eq!(got.args, cmd(&["--name", "two words"]));
        assert!(!got.subshell);
    }

    #[test]
    fn single_word() {
        let got = command_prep(&cmd(&["env"])).unwrap();
        assert_eq!(got.program, "env");
        assert!(got.args.is_empty());
        assert!(!got.subshell);
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(command_prep(&[]), Err(ConfigError::EmptyCommand));
        assert_eq!(command_prep(&cmd(&["   "])), Err(ConfigError::EmptyCommand));
    }
}

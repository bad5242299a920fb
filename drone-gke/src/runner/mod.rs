//! Command runner capability
//!
//! Every cluster-facing action goes through [`CommandRunner`]: run a program
//! with arguments, optionally piping a string to its stdin. The orchestrator
//! takes the runner by injection, so tests swap in [`RecordingRunner`].

pub mod process;
pub mod recording;

pub use process::DuctRunner;
pub use recording::{Invocation, RecordingRunner};

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("Failed to execute {program}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("{program} exited with {}", status_text(*code)))]
    Exit { program: String, code: Option<i32> },

    #[snafu(display("Failed to forward output of {program}"))]
    Forward {
        program: String,
        source: std::io::Error,
    },
}

impl CommandError {
    /// Exit code of the failed process, when it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Exit { code, .. } => *code,
            _ => None,
        }
    }
}

fn status_text(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "a signal".to_string(),
    }
}

/// Output kept from the most recent invocation. [`DuctRunner`] interleaves
/// stderr into `stdout`, the way a build log shows it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn is_empty(&self) -> bool {
        self.stdout.trim().is_empty() && self.stderr.trim().is_empty()
    }
}

pub trait CommandRunner {
    /// Run `program` with `args`, failing on a non-zero exit. Output is shown
    /// as it is produced.
    fn run(&mut self, program: &str, args: &[String]) -> Result<(), CommandError>;

    /// Like [`CommandRunner::run`], writing `input` to the child's stdin first.
    fn run_with_input(
        &mut self,
        input: &str,
        program: &str,
        args: &[String],
    ) -> Result<(), CommandError>;

    /// Output of the last invocation, for diagnostics after a failure.
    fn captured(&self) -> &CapturedOutput;
}

/// Render a command line for progress output.
pub fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

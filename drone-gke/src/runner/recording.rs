//! In-memory runner that records invocations instead of spawning processes

use super::{CapturedOutput, CommandError, CommandRunner, command_line};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub input: Option<String>,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        command_line(&self.program, &self.args)
    }
}

struct Failure {
    matches: Box<dyn Fn(&Invocation) -> bool>,
    code: i32,
    stderr: String,
}

/// Records every call and succeeds unless a registered failure matches.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Vec<Invocation>,
    failures: Vec<Failure>,
    last: CapturedOutput,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any invocation whose command line contains `needle`.
    pub fn fail_on(self, needle: &str, code: i32) -> Self {
        let needle = needle.to_string();
        self.fail_when(move |invocation| invocation.command_line().contains(&needle), code)
    }

    pub fn fail_when(mut self, matches: impl Fn(&Invocation) -> bool + 'static, code: i32) -> Self {
        self.failures.push(Failure {
            matches: Box::new(matches),
            code,
            stderr: format!("simulated failure (exit {code})\n"),
        });
        self
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations.iter().map(Invocation::command_line).collect()
    }

    fn record(&mut self, invocation: Invocation) -> Result<(), CommandError> {
        let failure = self
            .failures
            .iter()
            .find(|failure| (failure.matches)(&invocation))
            .map(|failure| (failure.code, failure.stderr.clone()));
        let program = invocation.program.clone();
        self.invocations.push(invocation);

        match failure {
            Some((code, stderr)) => {
                self.last = CapturedOutput {
                    stdout: String::new(),
                    stderr,
                };
                Err(CommandError::Exit {
                    program,
                    code: Some(code),
                })
            }
            None => {
                self.last = CapturedOutput::default();
                Ok(())
            }
        }
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<(), CommandError> {
        self.record(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            input: None,
        })
    }

    fn run_with_input(
        &mut self,
        input: &str,
        program: &str,
        args: &[String],
    ) -> Result<(), CommandError> {
        self.record(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            input: Some(input.to_string()),
        })
    }

    fn captured(&self) -> &CapturedOutput {
        &self.last
    }
}

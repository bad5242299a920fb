//! duct-backed runner used by the binary

use super::{CapturedOutput, CommandError, CommandRunner, ExitSnafu, ForwardSnafu, SpawnSnafu};
use snafu::ResultExt;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::PathBuf;

const CHUNK: usize = 8 * 1024;

/// Runs real processes.
///
/// stderr is folded into stdout and the combined stream is forwarded to the
/// output writer as it arrives, so long waits show progress in the build
/// log. A copy is kept for [`CommandRunner::captured`].
pub struct DuctRunner {
    dir: Option<PathBuf>,
    env: Option<Vec<(OsString, OsString)>>,
    output: Box<dyn Write>,
    last: CapturedOutput,
}

impl DuctRunner {
    /// Inherit the current directory and environment; forward to stdout.
    pub fn new() -> Self {
        Self {
            dir: None,
            env: None,
            output: Box::new(std::io::stdout()),
            last: CapturedOutput::default(),
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Replace the child environment entirely.
    pub fn with_env<K, V>(mut self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.env = Some(
            env.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    fn execute(
        &mut self,
        mut expression: duct::Expression,
        program: &str,
    ) -> Result<(), CommandError> {
        if let Some(dir) = &self.dir {
            expression = expression.dir(dir);
        }
        if let Some(env) = &self.env {
            expression = expression.full_env(env.iter().cloned());
        }

        self.last = CapturedOutput::default();
        let mut reader = expression
            .stderr_to_stdout()
            .unchecked()
            .reader()
            .context(SpawnSnafu { program })?;

        let mut seen = Vec::new();
        let mut chunk = [0_u8; CHUNK];
        loop {
            let read = reader.read(&mut chunk).context(ForwardSnafu { program })?;
            if read == 0 {
                break;
            }
            seen.extend_from_slice(&chunk[..read]);
            self.output
                .write_all(&chunk[..read])
                .and_then(|()| self.output.flush())
                .context(ForwardSnafu { program })?;
        }
        self.last.stdout = String::from_utf8_lossy(&seen).into_owned();

        // EOF on the reader means the child has been waited on.
        let code = match reader.try_wait().context(ForwardSnafu { program })? {
            Some(output) if output.status.success() => return Ok(()),
            Some(output) => output.status.code(),
            None => None,
        };

        ExitSnafu { program, code }.fail()
    }
}

impl Default for DuctRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for DuctRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<(), CommandError> {
        tracing::debug!("exec: {}", super::command_line(program, args));
        self.execute(duct::cmd(program, args), program)
    }

    fn run_with_input(
        &mut self,
        input: &str,
        program: &str,
        args: &[String],
    ) -> Result<(), CommandError> {
        tracing::debug!(
            "exec (stdin {} bytes): {}",
            input.len(),
            super::command_line(program, args)
        );
        self.execute(
            duct::cmd(program, args).stdin_bytes(input.as_bytes().to_vec()),
            program,
        )
    }

    fn captured(&self) -> &CapturedOutput {
        &self.last
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use batchdag::dag::BoxFuture;
use batchdag::errors::{BatchdagError, Result};
use batchdag::submit::CommandRunner;

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Failure { code: i32, stderr: String },
}

#[derive(Debug, Default)]
struct State {
    queued: HashMap<String, VecDeque<Reply>>,
    fallback: HashMap<String, Reply>,
    calls: Vec<Invocation>,
}

/// Scripted stand-in for external CLIs.
///
/// Replies queued per program are consumed in order; once a program's queue
/// is empty its fallback reply (if any) is used. A program with neither
/// fails like a missing binary (exit code 127).
#[derive(Debug, Clone, Default)]
pub struct FakeCommandRunner {
    state: Arc<Mutex<State>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stdout(&self, program: &str, stdout: &str) -> &Self {
        self.push(program, Reply::Stdout(stdout.to_string()))
    }

    pub fn push_failure(&self, program: &str, code: i32, stderr: &str) -> &Self {
        self.push(
            program,
            Reply::Failure {
                code,
                stderr: stderr.to_string(),
            },
        )
    }

    /// Reply used whenever nothing is queued for `program`.
    pub fn always_stdout(&self, program: &str, stdout: &str) -> &Self {
        self.lock()
            .fallback
            .insert(program.to_string(), Reply::Stdout(stdout.to_string()));
        self
    }

    pub fn always_fail(&self, program: &str, code: i32, stderr: &str) -> &Self {
        self.lock().fallback.insert(
            program.to_string(),
            Reply::Failure {
                code,
                stderr: stderr.to_string(),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.lock().calls.clone()
    }

    /// Argument lists of every call to `program`, in order.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.program == program)
            .map(|c| c.args.clone())
            .collect()
    }

    fn push(&self, program: &str, reply: Reply) -> &Self {
        self.lock()
            .queued
            .entry(program.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.calls.push(Invocation {
                program: program.to_string(),
                args: args.to_vec(),
            });

            let reply = state
                .queued
                .get_mut(program)
                .and_then(VecDeque::pop_front)
                .or_else(|| state.fallback.get(program).cloned());

            match reply {
                Some(Reply::Stdout(stdout)) => Ok(stdout),
                Some(Reply::Failure { code, stderr }) => Err(BatchdagError::CommandFailed {
                    program: program.to_string(),
                    code: Some(code),
                    stderr,
                }),
                None => Err(BatchdagError::CommandFailed {
                    program: program.to_string(),
                    code: Some(127),
                    stderr: format!("{program}: no scripted reply"),
                }),
            }
        })
    }
}

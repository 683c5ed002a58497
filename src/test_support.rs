//! Scripted command runner for unit tests

use crate::executor::{CommandOutput, CommandRunner, CommandStatus, Invocation};
use std::cell::RefCell;
use std::time::Duration;

type Responder = Box<dyn Fn(&Invocation) -> CommandOutput>;

/// Records every invocation and answers with a scripted response
pub struct ScriptedRunner {
    responder: Responder,
    calls: RefCell<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(responder: impl Fn(&Invocation) -> CommandOutput + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Runner where every command succeeds with empty output
    pub fn succeeding() -> Self {
        Self::new(|_| completed(""))
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> CommandOutput {
        self.calls.borrow_mut().push(invocation.clone());
        (self.responder)(invocation)
    }
}

pub fn completed(stdout: &str) -> CommandOutput {
    output(CommandStatus::Completed, stdout)
}

pub fn output(status: CommandStatus, stdout: &str) -> CommandOutput {
    CommandOutput {
        status,
        stdout: stdout.to_string(),
        stderr: String::new(),
        elapsed: Duration::from_millis(1),
        log_path: None,
    }
}

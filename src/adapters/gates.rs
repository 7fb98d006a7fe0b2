//! Command-backed gate runner.
//!
//! Runs a configured verification command per gate inside the worktree.
//! Exit code 0 accepts; anything else rejects with the captured output.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{CommandRunner, GateKind, GateOutcome, GateRequest, GateRunner};

/// A gate command line: program plus arguments.
#[derive(Debug, Clone)]
pub struct GateCommand {
    pub program: String,
    pub args: Vec<String>,
}

pub struct CommandGateRunner {
    runner: Arc<dyn CommandRunner>,
    commands: HashMap<GateKind, GateCommand>,
}

impl CommandGateRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            commands: HashMap::new(),
        }
    }

    pub fn with_command(mut self, gate: GateKind, command: GateCommand) -> Self {
        self.commands.insert(gate, command);
        self
    }
}

#[async_trait]
impl GateRunner for CommandGateRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        request: GateRequest,
    ) -> DomainResult<GateOutcome> {
        let command = self.commands.get(&request.gate).ok_or_else(|| {
            DomainError::Validation(format!("no command configured for gate {}", request.gate))
        })?;
        let mut args = command.args.clone();
        if request.full_suite {
            args.push("--full-suite".to_string());
        }
        let output = self
            .runner
            .run(cancel, &command.program, &args, Some(&request.worktree))
            .await?;
        let mut text = output.stdout;
        if !output.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&output.stderr);
        }
        Ok(GateOutcome {
            exit_code: output.exit_code,
            output: text,
        })
    }
}

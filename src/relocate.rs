//! Relocation of classified endpoints
//!
//! One move call per non-empty group, in configured group order. The first
//! failed call aborts the run; groups moved before it stay moved.

use std::io::{self, BufRead, StdinLock, Stdout, Write};

use tracing::info;

use crate::classify::ClassificationResult;
use crate::console::ConsoleApi;
use crate::error::Result;
use crate::output::Emit;
use crate::resolve::SiteDirectory;

/// Question asked before moving anything in local mode
pub const CONFIRM_QUESTION: &str = "Confirm changes and move the agents in the console? (Yes/No): ";

/// Source of the operator's go-ahead
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Only an explicit "yes" proceeds
pub fn is_confirmation(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

/// Asks on a writer and reads the answer from a reader
#[derive(Debug)]
pub struct PromptConfirm<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl PromptConfirm<StdinLock<'static>, Stdout> {
    /// Prompt on the terminal
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        write!(self.writer, "\n\n{}", question)?;
        self.writer.flush()?;

        let mut answer = String::new();
        // EOF leaves the answer empty, which declines
        self.reader.read_line(&mut answer)?;
        Ok(is_confirmation(&answer))
    }
}

/// Human-readable summary of what a run would move
pub fn render_plan(classification: &ClassificationResult) -> String {
    let mut plan = String::from(
        "=========================\nAgents that will be moved\n=========================",
    );

    for bucket in classification.non_empty() {
        plan.push('\n');
        plan.push_str(&bucket.group);
        plan.push(':');
        for name in bucket.names() {
            plan.push_str("\n\t");
            plan.push_str(name);
        }
    }

    plan
}

/// One completed move call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMove {
    pub group: String,
    pub site_id: String,
    pub names: Vec<String>,
}

impl GroupMove {
    /// Confirmation line reported after the move
    pub fn summary(&self) -> String {
        format!("{} -> {:?}", self.group, self.names)
    }
}

/// Moves performed by one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    pub moves: Vec<GroupMove>,
}

impl RelocationReport {
    pub fn moved_endpoints(&self) -> usize {
        self.moves.iter().map(|m| m.names.len()).sum()
    }
}

/// Issues the move calls for a classification
pub struct Relocator<'a> {
    api: &'a dyn ConsoleApi,
    sink: &'a dyn Emit,
}

impl<'a> Relocator<'a> {
    pub fn new(api: &'a dyn ConsoleApi, sink: &'a dyn Emit) -> Self {
        Self { api, sink }
    }

    /// Move every non-empty bucket into its group's site
    pub async fn execute(
        &self,
        classification: &ClassificationResult,
        directory: &SiteDirectory,
    ) -> Result<RelocationReport> {
        let mut report = RelocationReport::default();

        for bucket in classification.non_empty() {
            let site_id = directory.require(&bucket.group)?;
            let ids = bucket.ids();

            info!(
                "Moving {} agents to {} (site {})",
                ids.len(),
                bucket.group,
                site_id
            );
            self.api.move_to_site(site_id, &ids).await?;

            let done = GroupMove {
                group: bucket.group.clone(),
                site_id: site_id.to_string(),
                names: bucket.names().into_iter().map(str::to_string).collect(),
            };
            self.sink.emit(&done.summary())?;
            report.moves.push(done);
        }

        Ok(report)
    }
}

//! Sorting pipeline - resolves sites, classifies default-site agents and
//! moves them
//!
//! Stages run strictly in order. Fatal problems surface as
//! [`SorterError`](crate::error::SorterError); endings that are not failures
//! are reported as a [`RunOutcome`].

use tracing::{info, warn};

use crate::classify::{ClassificationResult, RuleSet};
use crate::config::Settings;
use crate::console::ConsoleApi;
use crate::error::Result;
use crate::output::Emit;
use crate::relocate::{render_plan, Confirm, RelocationReport, Relocator, CONFIRM_QUESTION};
use crate::resolve::SiteDirectory;

/// How a run that did not fail ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every non-empty group was moved
    Moved(RelocationReport),
    /// No agent matched any group
    NothingToMove,
    /// The operator did not confirm
    Declined,
    /// Dry run stopped after classification
    DryRun(ClassificationResult),
}

/// Options of a single run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after classification without prompting or moving
    pub dry_run: bool,
}

/// One sorting run against the console
pub struct Pipeline<'a> {
    settings: &'a Settings,
    rules: RuleSet,
    api: &'a dyn ConsoleApi,
    sink: &'a dyn Emit,
}

impl<'a> Pipeline<'a> {
    /// Compile the rule set and wire the stages together
    pub fn new(settings: &'a Settings, api: &'a dyn ConsoleApi, sink: &'a dyn Emit) -> Result<Self> {
        let rules = RuleSet::compile(&settings.rules)?;

        Ok(Self {
            settings,
            rules,
            api,
            sink,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Map configured groups onto console site ids
    pub async fn resolve_sites(&self) -> Result<SiteDirectory> {
        let directory = SiteDirectory::resolve(self.api, &self.rules).await?;
        self.sink.emit("Successfully loaded site ids from the API")?;
        Ok(directory)
    }

    /// Fetch the default site's agents and sort them into groups
    pub async fn classify(&self, directory: &SiteDirectory) -> Result<ClassificationResult> {
        let default_site_id = directory.require(&self.settings.rules.default_site)?;
        let endpoints = self.api.list_agents(default_site_id).await?;

        let classification = self.rules.classify(endpoints);
        for endpoint in classification.unmatched() {
            self.sink.emit(&format!(
                "WARNING: Endpoint {} did not match any group pattern. No action was performed.",
                endpoint.name
            ))?;
        }

        Ok(classification)
    }

    /// Run every stage, asking `confirm` before moving in local mode
    pub async fn run(&self, confirm: &mut dyn Confirm, options: RunOptions) -> Result<RunOutcome> {
        info!("Starting sorting run in {} mode", self.settings.env.mode);

        let directory = self.resolve_sites().await?;
        let classification = self.classify(&directory).await?;

        let interactive = self.settings.env.mode.is_interactive();
        if classification.has_moves() && (interactive || options.dry_run) {
            self.sink.emit(&render_plan(&classification))?;
        }

        if !classification.has_moves() {
            warn!("No agent matched any group");
            self.sink.emit(
                "WARNING: No agent to move. If this is not expected, \
                 edit the group patterns to include agents.",
            )?;
            return Ok(RunOutcome::NothingToMove);
        }

        if options.dry_run {
            info!(
                "Dry run: {} agents would be moved",
                classification.moved_count()
            );
            return Ok(RunOutcome::DryRun(classification));
        }

        if interactive && !confirm.confirm(CONFIRM_QUESTION)? {
            self.sink.emit("INFO: Aborted. No endpoint was moved.")?;
            return Ok(RunOutcome::Declined);
        }

        self.sink.emit("INFO: Moving agents...")?;
        let report = Relocator::new(self.api, self.sink)
            .execute(&classification, &directory)
            .await?;

        info!(
            "Moved {} agents across {} groups",
            report.moved_endpoints(),
            report.moves.len()
        );
        Ok(RunOutcome::Moved(report))
    }
}

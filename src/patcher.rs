//! The repository -> hooks -> patch pipeline.
//!
//! Every repository gets its own task that lists its hooks, and every hook
//! gets its own task that inspects and, when needed, patches it. Tasks are
//! spawned as soon as their input is known (a repository as soon as its
//! listing page arrives) and joined before [`HookPatcher::run`] returns. A failure anywhere below the organization listing is logged and
//! counted; it never stops sibling repositories or hooks.
//!
//! The number of concurrent HTTP requests is bounded by the client's
//! limiter, not by the number of tasks.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::ApiError;
use crate::github::GitHubClient;
use crate::model::Hook;
use crate::rewrite::UrlRewrite;

/// Whether matching hooks are actually patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Apply,
    DryRun,
}

/// What happened to a single hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// URL did not match; nothing sent.
    Skipped,
    /// PATCH accepted by the API.
    Patched,
    /// Would have been patched, but the run is a dry run.
    WouldPatch,
    /// PATCH failed; the error has been logged.
    Failed,
}

/// Totals for one run, logged when the pipeline drains.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub repositories: usize,
    pub hooks_inspected: usize,
    pub patched: usize,
    pub would_patch: usize,
    pub failed_repositories: usize,
    pub failed_hooks: usize,
}

impl Summary {
    pub const fn failures(&self) -> usize {
        self.failed_repositories + self.failed_hooks
    }

    fn record(&mut self, outcome: HookOutcome) {
        self.hooks_inspected += 1;
        match outcome {
            HookOutcome::Skipped => {}
            HookOutcome::Patched => self.patched += 1,
            HookOutcome::WouldPatch => self.would_patch += 1,
            HookOutcome::Failed => self.failed_hooks += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.repositories += other.repositories;
        self.hooks_inspected += other.hooks_inspected;
        self.patched += other.patched;
        self.would_patch += other.would_patch;
        self.failed_repositories += other.failed_repositories;
        self.failed_hooks += other.failed_hooks;
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} repositories, {} hooks inspected, {} patched",
            self.repositories, self.hooks_inspected, self.patched
        )?;
        if self.would_patch > 0 {
            write!(f, ", {} would be patched", self.would_patch)?;
        }
        write!(f, ", {} failures", self.failures())
    }
}

#[derive(Clone)]
pub struct HookPatcher {
    client: GitHubClient,
    org: Arc<str>,
    rewrite: Arc<UrlRewrite>,
    mode: Mode,
}

impl HookPatcher {
    pub fn new(client: GitHubClient, org: &str, rewrite: UrlRewrite, mode: Mode) -> Self {
        Self {
            client,
            org: Arc::from(org),
            rewrite: Arc::new(rewrite),
            mode,
        }
    }

    /// Run the whole pipeline once.
    ///
    /// Repository tasks are spawned as each listing page arrives. Only a
    /// failure to list the organization's repositories is returned as an
    /// error, and even then the tasks already spawned for earlier pages run
    /// to completion first. Everything else is isolated per repository and
    /// per hook.
    pub async fn run(&self) -> Result<Summary, ApiError> {
        let mut pages = self.client.repository_pages(&self.org)?;
        let mut tasks = JoinSet::new();
        let mut listed = 0;

        let listing = loop {
            match pages.next_page().await {
                Ok(Some(repos)) => {
                    listed += repos.len();
                    for repo in repos {
                        let this = self.clone();
                        tasks.spawn(async move { this.process_repository(repo.name).await });
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        match &listing {
            Ok(()) => tracing::debug!(org = %self.org, count = listed, "listed repositories"),
            Err(err) if listed > 0 => tracing::error!(
                org = %self.org,
                count = listed,
                "repository listing stopped early: {err}"
            ),
            Err(_) => {}
        }

        let mut summary = Summary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(repo_summary) => summary.merge(repo_summary),
                Err(err) => {
                    tracing::error!(error = %err, "repository task aborted");
                    summary.repositories += 1;
                    summary.failed_repositories += 1;
                }
            }
        }

        tracing::info!("done: {summary}");
        listing.map(|()| summary)
    }

    async fn process_repository(self, repo: String) -> Summary {
        let mut summary = Summary {
            repositories: 1,
            ..Summary::default()
        };

        let hooks = match self.client.list_hooks(&self.org, &repo).await {
            Ok(hooks) => hooks,
            Err(err) => {
                tracing::error!(repo = %repo, "failed to list hooks: {err}");
                summary.failed_repositories += 1;
                return summary;
            }
        };
        tracing::debug!(repo = %repo, count = hooks.len(), "listed hooks");

        let repo: Arc<str> = Arc::from(repo);
        let mut tasks = JoinSet::new();
        for hook in hooks {
            let this = self.clone();
            let repo = Arc::clone(&repo);
            tasks.spawn(async move { this.inspect_and_patch_hook(&repo, hook).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(err) => {
                    tracing::error!(repo = %repo, error = %err, "hook task aborted");
                    summary.record(HookOutcome::Failed);
                }
            }
        }

        summary
    }

    /// Patch `hook` if its URL is one of the insecure ones.
    pub async fn inspect_and_patch_hook(&self, repo: &str, hook: Hook) -> HookOutcome {
        let Some(patch) = self.rewrite.patch_for(&hook) else {
            return HookOutcome::Skipped;
        };

        tracing::info!("edit {repo}: {}", hook.name);
        if self.mode == Mode::DryRun {
            return HookOutcome::WouldPatch;
        }

        match self.client.patch_hook(&self.org, repo, hook.id, &patch).await {
            Ok(response) => {
                tracing::info!("{response}");
                HookOutcome::Patched
            }
            Err(err) => {
                tracing::error!(repo, hook_id = hook.id, "failed to patch hook: {err}");
                HookOutcome::Failed
            }
        }
    }
}

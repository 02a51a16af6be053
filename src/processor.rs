use crate::collectors::{BillCollector, DecreeCollector, ExpenseCollector, VoteCollector};
use crate::config::{Config, TrackerSettings};
use crate::error::{Error, Result};
use crate::format::{format_expense_thread, format_summary_thread, format_thread};
use crate::http::ApiClient;
use crate::publish::{publish_thread, Publisher, ThreadOutcome};
use crate::reconcile::{reconcile, ReconcilePolicy, Veto};
use crate::state::RunState;
use crate::types::{CollectedRecord, EntityKind, ItemId};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::fmt;
use tracing::{info, warn};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was selected for publishing
    Idle,
    Vetoed(Veto),
    /// Nothing to publish for the chosen item, which is still marked done
    Skipped(String),
    Published(ThreadOutcome),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Idle => f.write_str("nothing selected"),
            RunOutcome::Vetoed(Veto::DailyLimit { posted_today, max }) => {
                write!(f, "vetoed: {} of {} daily posts used", posted_today, max)
            }
            RunOutcome::Vetoed(Veto::BelowFloor { importance, floor }) => {
                write!(f, "vetoed: importance {} below floor {}", importance, floor)
            }
            RunOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            RunOutcome::Published(ThreadOutcome::Posted { segments, head }) => {
                write!(f, "posted {} segments ({})", segments, head)
            }
            RunOutcome::Published(ThreadOutcome::Duplicate { segments }) => {
                write!(f, "duplicate after {} segments", segments)
            }
            RunOutcome::Published(ThreadOutcome::Failed { segments, reason }) => {
                write!(f, "failed after {} segments: {}", segments, reason)
            }
        }
    }
}

/// What one tracker run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub task: &'static str,
    pub collected: usize,
    pub new_count: usize,
    pub changed_count: usize,
    pub pruned: usize,
    /// Display number (or name) of the published item
    pub selected: Option<String>,
    pub outcome: RunOutcome,
}

impl RunSummary {
    fn new(task: &'static str, collected: usize) -> Self {
        Self {
            task,
            collected,
            new_count: 0,
            changed_count: 0,
            pruned: 0,
            selected: None,
            outcome: RunOutcome::Idle,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Published(ThreadOutcome::Failed { .. }))
    }
}

/// Per-category counts in first-seen order
pub fn category_counts(records: &[CollectedRecord]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for record in records {
        match counts.iter_mut().find(|(name, _)| *name == record.category) {
            Some((_, count)) => *count += 1,
            None => counts.push((record.category.clone(), 1)),
        }
    }
    counts
}

/// Runs the incremental trackers: collect, reconcile, format, publish and
/// persist the state file.
pub struct TrackerProcessor {
    config: Config,
    api: ApiClient,
}

impl TrackerProcessor {
    pub fn new(config: Config) -> Result<Self> {
        let api = ApiClient::new(&config.api)?;
        Ok(Self { config, api })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn settings(&self, kind: EntityKind) -> TrackerSettings {
        match kind {
            EntityKind::Bill => self.config.bills,
            EntityKind::Vote => self.config.votes,
            EntityKind::Decree => self.config.decrees,
        }
    }

    /// Classified records of one entity kind, in listing order
    pub async fn collect(&self, kind: EntityKind, now: DateTime<Utc>) -> Vec<CollectedRecord> {
        let settings = self.settings(kind);
        match kind {
            EntityKind::Bill => {
                let collector = BillCollector::new(&self.api, settings);
                let records = collector.collect(now).collect().await;
                records
            }
            EntityKind::Vote => {
                let collector = VoteCollector::new(&self.api, settings);
                let records = collector.collect(now).collect().await;
                records
            }
            EntityKind::Decree => {
                let collector = DecreeCollector::new(&self.api, settings);
                let records = collector.collect(now).collect().await;
                records
            }
        }
    }

    async fn authors_for(&self, record: &CollectedRecord) -> Vec<String> {
        let ItemId::Numeric(id) = record.id else {
            return Vec::new();
        };
        match record.kind {
            EntityKind::Bill => {
                let collector = BillCollector::new(&self.api, self.config.bills);
                let authors = collector.fetch_authors(id).await;
                authors
            }
            EntityKind::Decree => {
                let collector = DecreeCollector::new(&self.api, self.config.decrees);
                let authors = collector.fetch_authors(id).await;
                authors
            }
            EntityKind::Vote => Vec::new(),
        }
    }

    /// One incremental run for `kind`.
    ///
    /// The state file is rewritten when nothing was published (so pruning
    /// sticks) or when the thread went out; a failed thread leaves it as it
    /// was.
    pub async fn run_tracker<P: Publisher + ?Sized>(
        &self,
        kind: EntityKind,
        publisher: &mut P,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let state_path = self.config.state_path();
        let mut state = RunState::load(&state_path)?;
        let settings = self.settings(kind);

        let records = self.collect(kind, now).await;
        info!(kind = %kind, collected = records.len(), "collection done");

        let policy = ReconcilePolicy::from(&settings);
        let reconciliation = reconcile(&records, state.tracked(kind), &policy, now);

        let mut summary = RunSummary::new(kind.as_str(), records.len());
        summary.new_count = reconciliation.new_count;
        summary.changed_count = reconciliation.changed_count;
        summary.pruned = reconciliation.pruned;

        let Some(selection) = reconciliation.selected else {
            if let Some(veto) = reconciliation.veto {
                summary.outcome = RunOutcome::Vetoed(veto);
            }
            state.set_tracked(kind, reconciliation.updated_tracked);
            state.save(&state_path)?;
            return Ok(summary);
        };

        summary.selected = Some(selection.record.display_number.clone());
        let authors = self.authors_for(&selection.record).await;
        let thread = format_thread(&selection.record, &authors, &selection.change);
        let outcome = publish_thread(publisher, &thread);

        if outcome.is_success() {
            state.set_tracked(kind, reconciliation.updated_tracked);
            state.save(&state_path)?;
            info!(kind = %kind, number = %selection.record.display_number, "published and saved");
        } else {
            warn!(kind = %kind, number = %selection.record.display_number, "publishing failed, state left untouched");
        }
        summary.outcome = RunOutcome::Published(outcome);
        Ok(summary)
    }

    /// Publish the expenses of the next legislator in the rotation.
    pub async fn run_expenses<P: Publisher + ?Sized>(
        &self,
        publisher: &mut P,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let state_path = self.config.state_path();
        let mut state = RunState::load(&state_path)?;

        let collector = ExpenseCollector::new(&self.api, self.config.expenses.clone());
        let legislators = collector.fetch_legislators().await;
        if legislators.is_empty() {
            return Err(Error::Validation("no legislators listed".to_string()));
        }

        let index = state.cursor(legislators.len());
        let legislator = &legislators[index];
        info!(index, of = legislators.len(), name = %legislator.nome, "processing legislator");

        let mut summary = RunSummary::new("expenses", legislators.len());
        summary.selected = Some(format!("{} ({})", legislator.nome, legislator.sigla_partido));

        let expenses = collector.summarize(legislator, now).await;
        if expenses.total <= 0.0 {
            info!(name = %legislator.nome, "no expenses recorded, moving on");
            state.last_processed_index = index + 1;
            state.save(&state_path)?;
            summary.outcome = RunOutcome::Skipped("no expenses recorded".to_string());
            return Ok(summary);
        }

        let thread = format_expense_thread(&expenses, self.config.expenses.months);
        let outcome = publish_thread(publisher, &thread);
        if outcome.is_success() {
            state.last_processed_index = index + 1;
            state.save(&state_path)?;
            info!(next = index + 1, "expense thread published");
        } else {
            warn!(name = %legislator.nome, "publishing failed, cursor not advanced");
        }
        summary.outcome = RunOutcome::Published(outcome);
        Ok(summary)
    }

    /// Digest of the bills currently in the collection window. Does not
    /// touch the state file.
    pub async fn run_summary<P: Publisher + ?Sized>(
        &self,
        publisher: &mut P,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let records = self.collect(EntityKind::Bill, now).await;
        let important = records
            .iter()
            .filter(|r| r.importance >= self.config.bills.min_importance)
            .count();
        let thread = format_summary_thread(records.len(), important, &category_counts(&records));

        let mut summary = RunSummary::new("summary", records.len());
        summary.outcome = RunOutcome::Published(publish_thread(publisher, &thread));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusDetail;

    fn record(category: &str) -> CollectedRecord {
        CollectedRecord {
            kind: EntityKind::Bill,
            id: ItemId::Numeric(1),
            display_number: "PL 1/2025".to_string(),
            summary: String::new(),
            presented_at: String::new(),
            status: StatusDetail::default(),
            importance: 3,
            category: category.to_string(),
            source_url: String::new(),
            full_text_url: None,
            authors: Vec::new(),
            tally: None,
            urgency: None,
        }
    }

    #[test]
    fn test_category_counts_keep_first_seen_order() {
        let records = vec![
            record("saúde"),
            record("economia"),
            record("saúde"),
            record("diversos"),
        ];
        assert_eq!(
            category_counts(&records),
            vec![
                ("saúde".to_string(), 2),
                ("economia".to_string(), 1),
                ("diversos".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_outcome_display() {
        let vetoed = RunOutcome::Vetoed(Veto::DailyLimit { posted_today: 3, max: 3 });
        assert_eq!(vetoed.to_string(), "vetoed: 3 of 3 daily posts used");
        let failed = RunSummary {
            outcome: RunOutcome::Published(ThreadOutcome::Failed {
                segments: 1,
                reason: "403".to_string(),
            }),
            ..RunSummary::new("bill", 4)
        };
        assert!(failed.failed());
    }
}

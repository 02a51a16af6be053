//! Historical backfill of the relational store.
//!
//! Each stage walks a long horizon in fixed units (legislator-month for
//! expenses, year for bills and decrees, 90-day window for votes), records
//! an audit row per unit and commits in batches. A failing unit is marked
//! `error` in the audit log and the stage moves on to the next unit.

use crate::classifier::KeywordClassifier;
use crate::collectors::expenses::ExpenseCollector;
use crate::collectors::votes::count_ballots;
use crate::collectors::{DecreeCollector, VoteCollector};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::ApiClient;
use crate::store::{BillRow, DecreeRow, Store, VoteRow};
use crate::types::{Ballot, Expense, Legislator, PropositionSummary, VoteSummary, VoteTally};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{debug, error, info, warn};

/// Legislators committed together during the expense backfill
pub const EXPENSE_COMMIT_EVERY: usize = 10;
/// Bills committed together during the bill backfill
pub const BILL_COMMIT_EVERY: usize = 100;
/// Length of one vote listing window
pub const VOTE_WINDOW_DAYS: i64 = 90;
/// Page size of the paginated historical listings
pub const HISTORY_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillTarget {
    Expenses,
    Bills,
    Votes,
    Decrees,
}

impl BackfillTarget {
    /// Stages of `backfill all`, in execution order
    pub const ALL: [BackfillTarget; 4] = [
        BackfillTarget::Expenses,
        BackfillTarget::Bills,
        BackfillTarget::Votes,
        BackfillTarget::Decrees,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillTarget::Expenses => "expenses",
            BackfillTarget::Bills => "bills",
            BackfillTarget::Votes => "votes",
            BackfillTarget::Decrees => "decrees",
        }
    }

    /// `tipo` written to the collection audit log
    pub fn audit_kind(&self) -> &'static str {
        match self {
            BackfillTarget::Expenses => "gastos",
            BackfillTarget::Bills => "pls",
            BackfillTarget::Votes => "votacoes",
            BackfillTarget::Decrees => "mps",
        }
    }

    /// Parse a command-line target; `all` expands to every stage.
    pub fn parse_list(value: &str) -> Result<Vec<BackfillTarget>> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(Self::ALL.to_vec()),
            "expenses" => Ok(vec![BackfillTarget::Expenses]),
            "bills" => Ok(vec![BackfillTarget::Bills]),
            "votes" => Ok(vec![BackfillTarget::Votes]),
            "decrees" => Ok(vec![BackfillTarget::Decrees]),
            other => Err(Error::Config(format!("unknown backfill target: {}", other))),
        }
    }
}

impl fmt::Display for BackfillTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horizon and volume caps of a backfill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillLimits {
    /// Calendar years covered, counting the current one
    pub years: u32,
    pub legislators: Option<usize>,
    pub bills_per_year: Option<usize>,
    pub votes: Option<usize>,
    pub decrees: Option<usize>,
}

impl BackfillLimits {
    pub fn full(years: u32) -> Self {
        Self {
            years: years.max(1),
            legislators: None,
            bills_per_year: None,
            votes: None,
            decrees: None,
        }
    }

    /// A small sample of the last year
    pub fn test() -> Self {
        Self {
            years: 1,
            legislators: Some(5),
            bills_per_year: Some(20),
            votes: Some(30),
            decrees: Some(20),
        }
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillReport {
    pub target: BackfillTarget,
    pub records: usize,
    pub requests: u64,
    /// Audit units that ended in `error`
    pub failed_units: usize,
    /// Set when the stage as a whole could not run
    pub error: Option<String>,
}

impl BackfillReport {
    fn new(target: BackfillTarget) -> Self {
        Self {
            target,
            records: 0,
            requests: 0,
            failed_units: 0,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Years covered by a backfill of `years` ending at `now`
pub fn year_range(now: DateTime<Utc>, years: u32) -> RangeInclusive<i32> {
    let last = now.year();
    (last - years.max(1) as i32 + 1)..=last
}

/// Months of `year` that have started by `now`
pub fn months_of(year: i32, now: DateTime<Utc>) -> RangeInclusive<u32> {
    if year == now.year() {
        1..=now.month()
    } else {
        1..=12
    }
}

/// Consecutive, non-overlapping windows of at most `VOTE_WINDOW_DAYS` days
/// covering the `years * 365` days up to `now`.
pub fn vote_windows(now: DateTime<Utc>, years: u32) -> Vec<(NaiveDate, NaiveDate)> {
    let end = now.date_naive();
    let mut start = end - Duration::days(years.max(1) as i64 * 365);
    let mut windows = Vec::new();
    while start <= end {
        let window_end = (start + Duration::days(VOTE_WINDOW_DAYS - 1)).min(end);
        windows.push((start, window_end));
        start = window_end + Duration::days(1);
    }
    windows
}

fn bill_row(summary: &PropositionSummary, classifier: &KeywordClassifier) -> BillRow {
    let classification = classifier.classify(&summary.ementa);
    let kind = if summary.sigla_tipo.is_empty() {
        "PL".to_string()
    } else {
        summary.sigla_tipo.clone()
    };
    BillRow {
        id: summary.id,
        display_number: format!("{} {}/{}", kind, summary.numero, summary.ano),
        year: summary.ano,
        summary: summary.ementa.clone(),
        author: String::new(),
        kind,
        presented_at: summary.data_apresentacao.clone(),
        status: String::new(),
        category: classification.category,
        importance: classification.importance,
        url: summary.uri.clone(),
    }
}

pub struct Backfill<'a> {
    api: &'a ApiClient,
    store: &'a Store,
    config: &'a Config,
    limits: BackfillLimits,
    now: DateTime<Utc>,
}

impl<'a> Backfill<'a> {
    pub fn new(
        api: &'a ApiClient,
        store: &'a Store,
        config: &'a Config,
        limits: BackfillLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            api,
            store,
            config,
            limits,
            now,
        }
    }

    /// Run `targets` in order. A stage that fails is reported and the next
    /// one still runs.
    pub async fn run(&self, targets: &[BackfillTarget]) -> Vec<BackfillReport> {
        let mut reports = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            info!(stage = index + 1, of = targets.len(), stage_name = %target, "backfill stage starting");
            let before = self.api.requests_issued();
            let mut report = match self.run_stage(*target).await {
                Ok(report) => report,
                Err(e) => {
                    error!(stage_name = %target, error = %e, "backfill stage failed");
                    let mut report = BackfillReport::new(*target);
                    report.error = Some(e.to_string());
                    report
                }
            };
            report.requests = self.api.requests_issued() - before;
            info!(
                stage_name = %target,
                records = report.records,
                requests = report.requests,
                failed_units = report.failed_units,
                "backfill stage done"
            );
            reports.push(report);
        }
        reports
    }

    async fn run_stage(&self, target: BackfillTarget) -> Result<BackfillReport> {
        match target {
            BackfillTarget::Expenses => self.expenses().await,
            BackfillTarget::Bills => self.bills().await,
            BackfillTarget::Votes => self.votes().await,
            BackfillTarget::Decrees => self.decrees().await,
        }
    }

    /// Close an audit row from a unit's result.
    fn finish_unit(&self, run_id: i64, result: Result<usize>, report: &mut BackfillReport) -> Result<()> {
        match result {
            Ok(count) => {
                report.records += count;
                self.store.complete_collection(run_id, count)
            }
            Err(e) => {
                warn!(run_id, error = %e, "backfill unit failed");
                report.failed_units += 1;
                self.store.fail_collection(run_id, &e.to_string())
            }
        }
    }

    /// Every expense of every legislator, month by month.
    pub async fn expenses(&self) -> Result<BackfillReport> {
        let target = BackfillTarget::Expenses;
        let mut report = BackfillReport::new(target);
        let collector = ExpenseCollector::new(self.api, self.config.expenses.clone());

        let mut legislators = collector.fetch_legislators().await;
        if legislators.is_empty() {
            return Err(Error::Validation("no legislators listed".to_string()));
        }
        if let Some(cap) = self.limits.legislators {
            legislators.truncate(cap);
        }
        self.store.with_transaction(|store| {
            for legislator in &legislators {
                store.upsert_legislator(legislator)?;
            }
            Ok(())
        })?;
        info!(count = legislators.len(), "legislators saved");

        for year in year_range(self.now, self.limits.years) {
            for month in months_of(year, self.now) {
                let run_id = self.store.start_collection(target.audit_kind(), year, Some(month))?;
                let result = self.expense_month(&collector, &legislators, year, month).await;
                self.finish_unit(run_id, result, &mut report)?;
            }
        }
        Ok(report)
    }

    async fn expense_month(
        &self,
        collector: &ExpenseCollector<'_>,
        legislators: &[Legislator],
        year: i32,
        month: u32,
    ) -> Result<usize> {
        let mut saved = 0;
        for (chunk_index, chunk) in legislators.chunks(EXPENSE_COMMIT_EVERY).enumerate() {
            let mut batch: Vec<(i64, Vec<Expense>)> = Vec::with_capacity(chunk.len());
            for legislator in chunk {
                match collector.fetch_month(legislator.id, year, month).await {
                    Ok(expenses) => batch.push((legislator.id, expenses)),
                    Err(e) => warn!(legislator_id = legislator.id, year, month, error = %e, "expenses not fetched"),
                }
            }

            saved += self.store.with_transaction(|store| {
                let mut inserted = 0;
                for (legislator_id, expenses) in &batch {
                    for expense in expenses {
                        match store.insert_expense(*legislator_id, expense) {
                            Ok(true) => inserted += 1,
                            Ok(false) => {}
                            Err(e) => warn!(legislator_id, error = %e, "expense row skipped"),
                        }
                    }
                }
                Ok(inserted)
            })?;

            let done = ((chunk_index + 1) * EXPENSE_COMMIT_EVERY).min(legislators.len());
            debug!(year, month, done, of = legislators.len(), saved, "expense progress");
        }
        info!(year, month, saved, "expense month stored");
        Ok(saved)
    }

    /// Every bill presented in each year of the horizon.
    pub async fn bills(&self) -> Result<BackfillReport> {
        let target = BackfillTarget::Bills;
        let mut report = BackfillReport::new(target);
        let classifier = KeywordClassifier::historical_bills();

        for year in year_range(self.now, self.limits.years) {
            let run_id = self.store.start_collection(target.audit_kind(), year, None)?;
            let result = self.bill_year(&classifier, year).await;
            self.finish_unit(run_id, result, &mut report)?;
        }
        Ok(report)
    }

    async fn bill_year(&self, classifier: &KeywordClassifier, year: i32) -> Result<usize> {
        let params = [
            ("siglaTipo", "PL".to_string()),
            ("ano", year.to_string()),
            ("ordem", "ASC".to_string()),
            ("ordenarPor", "id".to_string()),
        ];
        let listed: Vec<PropositionSummary> = self
            .api
            .get_pages("proposicoes", &params, HISTORY_PAGE_SIZE, self.limits.bills_per_year)
            .await?;
        info!(year, count = listed.len(), "bills listed");

        let mut saved = 0;
        for chunk in listed.chunks(BILL_COMMIT_EVERY) {
            saved += self.store.with_transaction(|store| {
                let mut stored = 0;
                for summary in chunk {
                    match store.upsert_bill(&bill_row(summary, classifier)) {
                        Ok(()) => stored += 1,
                        Err(e) => warn!(id = summary.id, error = %e, "bill row skipped"),
                    }
                }
                Ok(stored)
            })?;
            debug!(year, saved, of = listed.len(), "bill progress");
        }
        Ok(saved)
    }

    /// Votes in 90-day windows, each with its per-legislator ballots.
    pub async fn votes(&self) -> Result<BackfillReport> {
        let target = BackfillTarget::Votes;
        let mut report = BackfillReport::new(target);
        let collector = VoteCollector::new(self.api, self.config.votes);

        for (start, end) in vote_windows(self.now, self.limits.years) {
            let remaining = match self.limits.votes {
                Some(cap) if report.records >= cap => {
                    info!(cap, "vote cap reached");
                    break;
                }
                Some(cap) => Some(cap - report.records),
                None => None,
            };
            let run_id = self
                .store
                .start_collection(target.audit_kind(), start.year(), Some(start.month()))?;
            let result = self.vote_window(&collector, start, end, remaining).await;
            self.finish_unit(run_id, result, &mut report)?;
        }
        Ok(report)
    }

    async fn vote_window(
        &self,
        collector: &VoteCollector<'_>,
        start: NaiveDate,
        end: NaiveDate,
        limit: Option<usize>,
    ) -> Result<usize> {
        let params = [
            ("dataInicio", start.format("%Y-%m-%d").to_string()),
            ("dataFim", end.format("%Y-%m-%d").to_string()),
            ("ordem", "ASC".to_string()),
            ("ordenarPor", "dataHoraRegistro".to_string()),
        ];
        let listed: Vec<VoteSummary> = self
            .api
            .get_pages("votacoes", &params, HISTORY_PAGE_SIZE, limit)
            .await?;
        info!(start = %start, end = %end, count = listed.len(), "votes listed");

        let mut saved = 0;
        for summary in &listed {
            if summary.id.is_empty() {
                continue;
            }
            let Some(detail) = collector.fetch_details(&summary.id).await else {
                continue;
            };
            let ballots: Vec<Ballot> = match collector.fetch_ballots(&summary.id).await {
                Ok(ballots) => ballots,
                Err(e) => {
                    warn!(id = %summary.id, error = %e, "ballots not fetched, storing summary counters");
                    Vec::new()
                }
            };
            let tally = if ballots.is_empty() {
                VoteTally {
                    yes: detail.placar_sim,
                    no: detail.placar_nao,
                    other: detail.placar_outros,
                }
            } else {
                count_ballots(&ballots)
            };
            let record = collector.to_record(summary, &detail, tally);
            let row = VoteRow {
                id: record.id.to_string(),
                registered_at: detail.data_hora_registro.clone(),
                description: detail.descricao.clone(),
                body: detail.sigla_orgao.clone(),
                tally,
                importance: record.importance,
                proposition_id: detail.proposicao_objeto.id,
                proposition_label: detail.proposicao_objeto.descricao.clone(),
            };

            let stored = self.store.with_transaction(|store| {
                store.upsert_vote(&row)?;
                for ballot in ballots.iter().filter(|b| b.deputado.id != 0) {
                    if let Err(e) = store.insert_ballot(&row.id, ballot.deputado.id, &ballot.tipo_voto.to_lowercase()) {
                        warn!(vote = %row.id, legislator = ballot.deputado.id, error = %e, "ballot skipped");
                    }
                }
                Ok(())
            });
            match stored {
                Ok(()) => saved += 1,
                Err(e) => warn!(id = %row.id, error = %e, "vote row skipped"),
            }
        }
        Ok(saved)
    }

    /// Provisional decrees presented in each year, with their urgency.
    pub async fn decrees(&self) -> Result<BackfillReport> {
        let target = BackfillTarget::Decrees;
        let mut report = BackfillReport::new(target);
        let collector = DecreeCollector::new(self.api, self.config.decrees);

        for year in year_range(self.now, self.limits.years) {
            let remaining = match self.limits.decrees {
                Some(cap) if report.records >= cap => {
                    info!(cap, "decree cap reached");
                    break;
                }
                Some(cap) => Some(cap - report.records),
                None => None,
            };
            let run_id = self.store.start_collection(target.audit_kind(), year, None)?;
            let result = self.decree_year(&collector, year, remaining).await;
            self.finish_unit(run_id, result, &mut report)?;
        }
        Ok(report)
    }

    async fn decree_year(&self, collector: &DecreeCollector<'_>, year: i32, limit: Option<usize>) -> Result<usize> {
        let params = [
            ("ano", year.to_string()),
            ("siglaTipo", "MPV".to_string()),
            ("ordem", "ASC".to_string()),
            ("ordenarPor", "dataApresentacao".to_string()),
        ];
        let listed: Vec<PropositionSummary> = self
            .api
            .get_pages("proposicoes", &params, HISTORY_PAGE_SIZE, limit)
            .await?;
        info!(year, count = listed.len(), "decrees listed");

        let mut saved = 0;
        for summary in &listed {
            let Some(detail) = collector.fetch_details(summary.id).await else {
                continue;
            };
            let record = collector.to_record(&detail, self.now);
            let status = if record.status.procedure.is_empty() {
                "N/A".to_string()
            } else {
                record.status.procedure.clone()
            };
            let row = DecreeRow {
                id: detail.id,
                display_number: record.display_number.clone(),
                summary: record.summary.clone(),
                presented_at: record.presented_at.clone(),
                status,
                urgency: record.urgency.unwrap_or_default(),
                importance: record.importance,
                category: record.category.clone(),
            };
            match self.store.upsert_decree(&row) {
                Ok(()) => saved += 1,
                Err(e) => warn!(id = detail.id, error = %e, "decree row skipped"),
            }
        }
        Ok(saved)
    }
}

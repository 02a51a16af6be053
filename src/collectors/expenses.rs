use crate::config::ExpenseSettings;
use crate::error::Result;
use crate::format::title_case;
use crate::http::ApiClient;
use crate::types::{Expense, Legislator};
use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};

/// Spend of one legislator over a period
#[derive(Debug, Clone)]
pub struct ExpenseSummary {
    pub legislator: Legislator,
    pub total: f64,
    /// Title-cased expense type and its total, largest first
    pub by_category: Vec<(String, f64)>,
    pub largest: Option<Expense>,
}

/// `"PASSAGEM AÉREA - SIGEPA."` -> `"Passagem Aérea - Sigepa"`
pub fn expense_category(kind: &str) -> String {
    title_case(kind.replace('.', "").trim())
}

/// Total, per-category totals and the largest single expense.
pub fn summarize_expenses(legislator: &Legislator, expenses: &[Expense]) -> ExpenseSummary {
    let mut total = 0.0;
    let mut by_category: Vec<(String, f64)> = Vec::new();
    let mut largest: Option<&Expense> = None;

    for expense in expenses {
        total += expense.valor_liquido;

        let category = expense_category(&expense.tipo_despesa);
        match by_category.iter_mut().find(|(name, _)| *name == category) {
            Some((_, sum)) => *sum += expense.valor_liquido,
            None => by_category.push((category, expense.valor_liquido)),
        }

        let current = largest.map(|e| e.valor_liquido).unwrap_or(0.0);
        if expense.valor_liquido > current {
            largest = Some(expense);
        }
    }

    // stable: equal totals keep first-seen order
    by_category.sort_by(|a, b| b.1.total_cmp(&a.1));

    ExpenseSummary {
        legislator: legislator.clone(),
        total,
        by_category,
        largest: largest.cloned(),
    }
}

/// `(year, month)` of the `count` calendar months ending at `now`, oldest first.
pub fn recent_months(now: DateTime<Utc>, count: u32) -> Vec<(i32, u32)> {
    let mut year = now.year();
    let mut month = now.month();
    let mut months = Vec::with_capacity(count as usize);
    for _ in 0..count {
        months.push((year, month));
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    months.reverse();
    months
}

/// Collector for legislator expenses (parliamentary quota)
pub struct ExpenseCollector<'a> {
    api: &'a ApiClient,
    settings: ExpenseSettings,
}

impl<'a> ExpenseCollector<'a> {
    pub fn new(api: &'a ApiClient, settings: ExpenseSettings) -> Self {
        Self { api, settings }
    }

    /// Sitting legislators ordered by name
    pub async fn fetch_legislators(&self) -> Vec<Legislator> {
        let params = [
            ("itens", "600".to_string()),
            ("ordem", "ASC".to_string()),
            ("ordenarPor", "nome".to_string()),
        ];
        let legislators: Vec<Legislator> = self.api.get_list("deputados", &params).await;
        info!(count = legislators.len(), "listed legislators");
        legislators
    }

    /// Every expense of a legislator in one month, across pages
    pub async fn fetch_month(&self, legislator_id: i64, year: i32, month: u32) -> Result<Vec<Expense>> {
        let params = [("ano", year.to_string()), ("mes", month.to_string())];
        self.api
            .get_pages(
                &format!("deputados/{}/despesas", legislator_id),
                &params,
                self.settings.page_size,
                None,
            )
            .await
    }

    /// Expenses of the configured number of months ending at `now`. A month
    /// that fails to load is left out.
    pub async fn fetch_recent(&self, legislator_id: i64, now: DateTime<Utc>) -> Vec<Expense> {
        let mut expenses = Vec::new();
        for (year, month) in recent_months(now, self.settings.months) {
            match self.fetch_month(legislator_id, year, month).await {
                Ok(batch) => expenses.extend(batch),
                Err(e) => warn!(legislator_id, year, month, error = %e, "skipping expense month"),
            }
        }
        expenses
    }

    pub async fn summarize(&self, legislator: &Legislator, now: DateTime<Utc>) -> ExpenseSummary {
        let expenses = self.fetch_recent(legislator.id, now).await;
        summarize_expenses(legislator, &expenses)
    }
}

use super::{fetch_authors, fetch_proposition, proposition_page_url, status_detail};
use crate::classifier::KeywordClassifier;
use crate::config::TrackerSettings;
use crate::http::ApiClient;
use crate::types::{
    parse_timestamp, CollectedRecord, DecreeUrgency, EntityKind, ItemId, PropositionDetail,
    PropositionSummary,
};
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use tracing::{debug, info, warn};

/// Days a provisional decree has before it lapses (60 + 60 extension)
pub const DECREE_DEADLINE_DAYS: i64 = 120;

/// Deadline urgency of a decree presented at `presented_at`.
///
/// Levels: lapsed or 10 days left 5, 30 days 4, 60 days 3, 90 days 2,
/// otherwise 1. Without a readable date the level is 0.
pub fn decree_urgency(presented_at: &str, now: DateTime<Utc>) -> DecreeUrgency {
    if presented_at.trim().is_empty() {
        return DecreeUrgency::default();
    }
    let presented = match parse_timestamp(presented_at) {
        Ok(ts) => ts,
        Err(e) => {
            warn!(error = %e, "cannot compute decree urgency");
            return DecreeUrgency::default();
        }
    };

    let elapsed = (now - presented).num_days();
    let remaining = DECREE_DEADLINE_DAYS - elapsed;
    let level = match remaining {
        r if r < 0 => 5,
        r if r <= 10 => 5,
        r if r <= 30 => 4,
        r if r <= 60 => 3,
        r if r <= 90 => 2,
        _ => 1,
    };

    DecreeUrgency {
        days_remaining: Some(remaining),
        level,
        expired: remaining < 0,
    }
}

/// Collector for provisional decrees (`siglaTipo=MPV`)
pub struct DecreeCollector<'a> {
    api: &'a ApiClient,
    classifier: KeywordClassifier,
    settings: TrackerSettings,
}

impl<'a> DecreeCollector<'a> {
    pub fn new(api: &'a ApiClient, settings: TrackerSettings) -> Self {
        Self {
            api,
            classifier: KeywordClassifier::decrees(),
            settings,
        }
    }

    /// Most recent decrees by id. Decrees are not filtered by date.
    pub async fn fetch_recent(&self, max_items: usize) -> Vec<PropositionSummary> {
        let params = [
            ("siglaTipo", "MPV".to_string()),
            ("ordem", "DESC".to_string()),
            ("ordenarPor", "id".to_string()),
            ("itens", max_items.to_string()),
        ];
        let decrees: Vec<PropositionSummary> = self.api.get_list("proposicoes", &params).await;
        info!(count = decrees.len(), "listed decrees");
        decrees
    }

    pub async fn fetch_details(&self, id: i64) -> Option<PropositionDetail> {
        fetch_proposition(self.api, id).await
    }

    pub async fn fetch_authors(&self, id: i64) -> Vec<String> {
        fetch_authors(self.api, id).await
    }

    pub fn to_record(&self, detail: &PropositionDetail, now: DateTime<Utc>) -> CollectedRecord {
        let classification = self.classifier.classify(&detail.ementa);
        CollectedRecord {
            kind: EntityKind::Decree,
            id: ItemId::Numeric(detail.id),
            display_number: format!("MPV {}/{}", detail.numero, detail.ano),
            summary: detail.ementa.clone(),
            presented_at: detail.data_apresentacao.clone(),
            status: status_detail(&detail.status_proposicao),
            importance: classification.importance,
            category: classification.category,
            source_url: proposition_page_url(detail.id),
            full_text_url: Some(detail.url_inteiro_teor.clone()).filter(|u| !u.is_empty()),
            authors: Vec::new(),
            tally: None,
            urgency: Some(decree_urgency(&detail.data_apresentacao, now)),
        }
    }

    /// Worth following: close to the deadline or important on its own.
    pub fn is_relevant(record: &CollectedRecord) -> bool {
        let urgency = record.urgency.map(|u| u.level).unwrap_or(0);
        urgency >= 2 || record.importance >= 3
    }

    /// Relevant classified decrees, in listing order.
    pub fn collect(&self, now: DateTime<Utc>) -> impl Stream<Item = CollectedRecord> + '_ {
        Box::pin(stream! {
            let listed = self.fetch_recent(self.settings.page_size).await;

            for summary in listed.iter().take(self.settings.detail_limit) {
                let Some(detail) = self.fetch_details(summary.id).await else {
                    continue;
                };
                let record = self.to_record(&detail, now);
                if !Self::is_relevant(&record) {
                    debug!(id = detail.id, "decree neither urgent nor important, skipped");
                    continue;
                }
                yield record;
            }
        })
    }
}

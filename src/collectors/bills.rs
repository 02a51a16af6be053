use super::{fetch_authors, fetch_proposition, proposition_page_url, status_detail, window_start};
use crate::classifier::KeywordClassifier;
use crate::config::TrackerSettings;
use crate::http::ApiClient;
use crate::types::{
    CollectedRecord, EntityKind, ItemId, ProceduralStep, PropositionDetail, PropositionSummary,
};
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use tracing::{debug, info};

/// Collector for bills (`siglaTipo=PL`)
pub struct BillCollector<'a> {
    api: &'a ApiClient,
    classifier: KeywordClassifier,
    settings: TrackerSettings,
}

impl<'a> BillCollector<'a> {
    pub fn new(api: &'a ApiClient, settings: TrackerSettings) -> Self {
        Self {
            api,
            classifier: KeywordClassifier::bills(),
            settings,
        }
    }

    /// Bills presented within the last `window_days`, newest id first.
    pub async fn fetch_recent(
        &self,
        window_days: i64,
        max_items: usize,
        now: DateTime<Utc>,
    ) -> Vec<PropositionSummary> {
        let params = [
            ("siglaTipo", "PL".to_string()),
            ("dataInicio", window_start(now, window_days)),
            ("ordem", "DESC".to_string()),
            ("ordenarPor", "id".to_string()),
            ("itens", max_items.to_string()),
        ];
        let bills: Vec<PropositionSummary> = self.api.get_list("proposicoes", &params).await;
        info!(count = bills.len(), window_days, "listed recent bills");
        bills
    }

    pub async fn fetch_details(&self, id: i64) -> Option<PropositionDetail> {
        fetch_proposition(self.api, id).await
    }

    /// `Nome (PARTIDO-UF)` of at most three authors
    pub async fn fetch_authors(&self, id: i64) -> Vec<String> {
        fetch_authors(self.api, id).await
    }

    /// First `limit` procedural steps as listed by the API
    pub async fn fetch_history(&self, id: i64, limit: usize) -> Vec<ProceduralStep> {
        let steps: Vec<ProceduralStep> = self
            .api
            .get_list(&format!("proposicoes/{}/tramitacoes", id), &[])
            .await;
        steps.into_iter().take(limit).collect()
    }

    pub fn to_record(&self, detail: &PropositionDetail) -> CollectedRecord {
        let classification = self.classifier.classify(&detail.ementa);
        CollectedRecord {
            kind: EntityKind::Bill,
            id: ItemId::Numeric(detail.id),
            display_number: detail.display_number(),
            summary: detail.ementa.clone(),
            presented_at: detail.data_apresentacao.clone(),
            status: status_detail(&detail.status_proposicao),
            importance: classification.importance,
            category: classification.category,
            source_url: proposition_page_url(detail.id),
            full_text_url: Some(detail.url_inteiro_teor.clone()).filter(|u| !u.is_empty()),
            authors: Vec::new(),
            tally: None,
            urgency: None,
        }
    }

    /// Classified records for the configured window, in listing order.
    pub fn collect(&self, now: DateTime<Utc>) -> impl Stream<Item = CollectedRecord> + '_ {
        Box::pin(stream! {
            let listed = self
                .fetch_recent(self.settings.window_days, self.settings.page_size, now)
                .await;

            for summary in listed.iter().take(self.settings.detail_limit) {
                if let Some(detail) = self.fetch_details(summary.id).await {
                    let record = self.to_record(&detail);
                    debug!(
                        id = detail.id,
                        importance = record.importance,
                        category = %record.category,
                        "classified bill"
                    );
                    yield record;
                }
            }
        })
    }
}

use super::{proposition_id_from_uri, proposition_page_url, window_start};
use crate::classifier::KeywordClassifier;
use crate::config::TrackerSettings;
use crate::error::Result;
use crate::http::ApiClient;
use crate::types::{
    Ballot, CollectedRecord, EntityKind, ItemId, PartyOrientation, StatusDetail, VoteDetail,
    VoteSummary, VoteTally,
};
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use tracing::{debug, info, warn};

/// Count individual ballots: `sim` is yes, `não`/`nao` is no, anything else
/// (abstention, obstruction, "Artigo 17") is other.
pub fn count_ballots(ballots: &[Ballot]) -> VoteTally {
    let mut tally = VoteTally::default();
    for ballot in ballots {
        match ballot.tipo_voto.trim().to_lowercase().as_str() {
            "sim" => tally.yes += 1,
            "não" | "nao" => tally.no += 1,
            _ => tally.other += 1,
        }
    }
    tally
}

/// Collector for plenary and committee votes
pub struct VoteCollector<'a> {
    api: &'a ApiClient,
    classifier: KeywordClassifier,
    settings: TrackerSettings,
}

impl<'a> VoteCollector<'a> {
    pub fn new(api: &'a ApiClient, settings: TrackerSettings) -> Self {
        Self {
            api,
            classifier: KeywordClassifier::votes(),
            settings,
        }
    }

    pub async fn fetch_recent(
        &self,
        window_days: i64,
        max_items: usize,
        now: DateTime<Utc>,
    ) -> Vec<VoteSummary> {
        let params = [
            ("dataInicio", window_start(now, window_days)),
            ("ordem", "DESC".to_string()),
            ("ordenarPor", "dataHoraRegistro".to_string()),
            ("itens", max_items.to_string()),
        ];
        let votes: Vec<VoteSummary> = self.api.get_list("votacoes", &params).await;
        info!(count = votes.len(), window_days, "listed recent votes");
        votes
    }

    pub async fn fetch_details(&self, id: &str) -> Option<VoteDetail> {
        match self
            .api
            .get_dados::<VoteDetail>(&format!("votacoes/{}", id), &[])
            .await
        {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!(id = %id, error = %e, "skipping vote, detail fetch failed");
                None
            }
        }
    }

    /// Individual ballots, one per legislator
    pub async fn fetch_ballots(&self, id: &str) -> Result<Vec<Ballot>> {
        self.api.get_dados(&format!("votacoes/{}/votos", id), &[]).await
    }

    /// Party and bloc orientations; empty when unavailable
    pub async fn fetch_orientations(&self, id: &str) -> Vec<PartyOrientation> {
        self.api
            .get_list(&format!("votacoes/{}/orientacoes", id), &[])
            .await
    }

    /// Tally from the ballots, or from the summary counters when the ballot
    /// listing cannot be fetched.
    pub async fn fetch_tally(&self, id: &str, detail: &VoteDetail) -> VoteTally {
        match self.fetch_ballots(id).await {
            Ok(ballots) => {
                let tally = count_ballots(&ballots);
                debug!(id = %id, yes = tally.yes, no = tally.no, other = tally.other, "ballots counted");
                tally
            }
            Err(e) => {
                warn!(id = %id, error = %e, "ballot fetch failed, using summary counters");
                VoteTally {
                    yes: detail.placar_sim,
                    no: detail.placar_nao,
                    other: detail.placar_outros,
                }
            }
        }
    }

    pub fn to_record(&self, summary: &VoteSummary, detail: &VoteDetail, tally: VoteTally) -> CollectedRecord {
        let id = if detail.id.is_empty() { summary.id.clone() } else { detail.id.clone() };
        let subject = detail.proposicao_objeto.descricao.clone();
        let classification = self
            .classifier
            .classify_any(&[detail.descricao.as_str(), subject.as_str()]);

        let proposition_id = detail
            .proposicao_objeto
            .id
            .or_else(|| proposition_id_from_uri(&summary.uri_proposicao_objeto));
        let source_url = proposition_id
            .map(proposition_page_url)
            .unwrap_or_else(|| self.api.url_for(&format!("votacoes/{}", id)));

        let display_number = if subject.trim().is_empty() {
            format!("Votação {}", id)
        } else {
            subject
        };

        CollectedRecord {
            kind: EntityKind::Vote,
            id: ItemId::Text(id),
            display_number,
            summary: detail.descricao.clone(),
            presented_at: detail.data_hora_registro.clone(),
            status: StatusDetail {
                date: detail.data_hora_registro.clone(),
                procedure: tally.result_label().to_string(),
                dispatch: String::new(),
                situation: detail.descricao.clone(),
                body: detail.sigla_orgao.clone(),
            },
            importance: classification.importance,
            category: classification.category,
            source_url,
            full_text_url: None,
            authors: Vec::new(),
            tally: Some(tally),
            urgency: None,
        }
    }

    /// Classified votes with their tallies, in listing order.
    pub fn collect(&self, now: DateTime<Utc>) -> impl Stream<Item = CollectedRecord> + '_ {
        Box::pin(stream! {
            let listed = self
                .fetch_recent(self.settings.window_days, self.settings.page_size, now)
                .await;

            for summary in listed.iter().take(self.settings.detail_limit) {
                if summary.id.is_empty() {
                    warn!("vote without id in listing, skipped");
                    continue;
                }
                let Some(detail) = self.fetch_details(&summary.id).await else {
                    continue;
                };
                let tally = self.fetch_tally(&summary.id, &detail).await;
                yield self.to_record(summary, &detail, tally);
            }
        })
    }
}

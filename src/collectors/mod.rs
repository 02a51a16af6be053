//! Per-entity collectors: list recent items, fetch the details of a bounded
//! prefix of that list, classify and shape them into [`CollectedRecord`]s.
//!
//! Collectors never fail as a whole. A listing failure yields no records and
//! a failed detail fetch drops that one item.
//!
//! [`CollectedRecord`]: crate::types::CollectedRecord

pub mod bills;
pub mod decrees;
pub mod expenses;
pub mod votes;

pub use bills::BillCollector;
pub use decrees::DecreeCollector;
pub use expenses::{ExpenseCollector, ExpenseSummary};
pub use votes::VoteCollector;

use crate::http::ApiClient;
use crate::types::{Author, PropositionDetail, PropositionStatus, StatusDetail};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Authors kept per proposition
pub const MAX_AUTHORS: usize = 3;

/// Situation shown when the API leaves it blank
pub const DEFAULT_SITUATION: &str = "Em tramitação";

/// `dataInicio` value for a window ending at `now`
pub fn window_start(now: DateTime<Utc>, days: i64) -> String {
    (now - Duration::days(days)).format("%Y-%m-%d").to_string()
}

/// Public page of a proposition on camara.leg.br
pub fn proposition_page_url(id: i64) -> String {
    format!(
        "https://www.camara.leg.br/proposicoesWeb/fichadetramitacao?idProposicao={}",
        id
    )
}

/// Proposition id at the end of an API uri such as `.../proposicoes/2345678`
pub fn proposition_id_from_uri(uri: &str) -> Option<i64> {
    static PROPOSITION_URI: OnceLock<Regex> = OnceLock::new();
    let re = PROPOSITION_URI.get_or_init(|| {
        Regex::new(r"/proposicoes/(\d+)/?$").unwrap_or_else(|e| unreachable!("invalid regex: {}", e))
    });
    re.captures(uri)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub(crate) fn status_detail(status: &PropositionStatus) -> StatusDetail {
    let situation = if status.descricao_situacao.trim().is_empty() {
        DEFAULT_SITUATION.to_string()
    } else {
        status.descricao_situacao.clone()
    };
    StatusDetail {
        date: status.data_hora.clone(),
        procedure: status.descricao_tramitacao.clone(),
        dispatch: status.despacho.clone(),
        situation,
        body: status.sigla_orgao.clone(),
    }
}

/// `GET /proposicoes/{id}`, logging and swallowing failures.
pub(crate) async fn fetch_proposition(api: &ApiClient, id: i64) -> Option<PropositionDetail> {
    match api
        .get_dados::<PropositionDetail>(&format!("proposicoes/{}", id), &[])
        .await
    {
        Ok(detail) => Some(detail),
        Err(e) => {
            warn!(id, error = %e, "skipping proposition, detail fetch failed");
            None
        }
    }
}

/// Up to [`MAX_AUTHORS`] labelled authors of a proposition.
pub(crate) async fn fetch_authors(api: &ApiClient, id: i64) -> Vec<String> {
    let authors: Vec<Author> = api
        .get_list(&format!("proposicoes/{}/autores", id), &[])
        .await;
    authors
        .iter()
        .filter_map(Author::label)
        .take(MAX_AUTHORS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_start() {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(window_start(now, 7), "2025-02-26");
        assert_eq!(window_start(now, 0), "2025-03-05");
    }

    #[test]
    fn test_proposition_id_from_uri() {
        let uri = "https://dadosabertos.camara.leg.br/api/v2/proposicoes/2270800";
        assert_eq!(proposition_id_from_uri(uri), Some(2270800));
        assert_eq!(proposition_id_from_uri(&format!("{}/", uri)), Some(2270800));
        assert_eq!(proposition_id_from_uri(""), None);
        assert_eq!(
            proposition_id_from_uri("https://dadosabertos.camara.leg.br/api/v2/votacoes/1-2"),
            None
        );
    }

    #[test]
    fn test_blank_situation_defaults() {
        let status = PropositionStatus {
            descricao_tramitacao: "Apresentação de Proposição".to_string(),
            sigla_orgao: "PLEN".to_string(),
            ..Default::default()
        };
        let detail = status_detail(&status);
        assert_eq!(detail.situation, DEFAULT_SITUATION);
        assert_eq!(detail.procedure, "Apresentação de Proposição");
        assert_eq!(detail.body, "PLEN");
    }
}

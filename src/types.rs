use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Deserialize `null` the same way as an absent field.
///
/// The open data API sends `null` for many text fields that are usually
/// present, so every optional-in-practice field goes through this.
pub fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse the timestamps found in API payloads and older state files.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM[:SS[.f]]` and bare dates.
/// Naive values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(Error::InvalidTimestamp(value.to_string()))
}

fn flexible_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Natural key of a record in the source system.
///
/// Propositions (bills, decrees) use integer ids; votes use composite
/// string ids such as `"2438311-45"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Numeric(n) => write!(f, "{}", n),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(n: i64) -> Self {
        ItemId::Numeric(n)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::Text(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId::Text(s)
    }
}

/// Entity types handled by the trackers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Bill,
    Vote,
    Decree,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Bill => "bill",
            EntityKind::Vote => "vote",
            EntityKind::Decree => "decree",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Wire records (Câmara dos Deputados open data API v2)
// ============================================================================

/// Entry of `GET /proposicoes`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropositionSummary {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_tipo: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub numero: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ano: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ementa: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_apresentacao: String,
}

/// `statusProposicao` block of a proposition detail
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropositionStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_hora: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao_tramitacao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub despacho: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao_situacao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_orgao: String,
}

/// Body of `GET /proposicoes/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropositionDetail {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_tipo: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub numero: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ano: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ementa: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_apresentacao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_proposicao: PropositionStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_inteiro_teor: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri_autores: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
}

impl PropositionDetail {
    /// Human readable number such as `PL 1234/2024`
    pub fn display_number(&self) -> String {
        format!("{} {}/{}", self.sigla_tipo, self.numero, self.ano)
    }
}

/// Entry of `GET /proposicoes/{id}/autores`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default, deserialize_with = "null_as_default")]
    pub nome: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_partido: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_uf: String,
}

impl Author {
    /// `Nome (PARTIDO-UF)`, or just the name when party or state is unknown.
    pub fn label(&self) -> Option<String> {
        if self.nome.is_empty() {
            return None;
        }
        if !self.sigla_partido.is_empty() && !self.sigla_uf.is_empty() {
            Some(format!("{} ({}-{})", self.nome, self.sigla_partido, self.sigla_uf))
        } else {
            Some(self.nome.clone())
        }
    }
}

/// Entry of `GET /proposicoes/{id}/tramitacoes`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceduralStep {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_hora: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao_tramitacao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_orgao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub despacho: String,
}

/// Entry of `GET /votacoes`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_hora_registro: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_orgao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri_proposicao_objeto: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
}

/// `proposicaoObjeto` block of a vote detail
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSubject {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao: String,
}

/// Body of `GET /votacoes/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteDetail {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_hora_registro: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_orgao: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proposicao_objeto: VoteSubject,
    #[serde(default, deserialize_with = "null_as_default")]
    pub placar_sim: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub placar_nao: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub placar_outros: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri_votos: String,
}

/// Legislator reference embedded in a ballot
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegislatorRef {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nome: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_partido: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_uf: String,
}

/// Entry of `GET /votacoes/{id}/votos`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tipo_voto: String,
    #[serde(rename = "deputado_", default, deserialize_with = "null_as_default")]
    pub deputado: LegislatorRef,
}

/// Entry of `GET /votacoes/{id}/orientacoes`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyOrientation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_partido_bloco: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub orientacao_voto: String,
}

/// Entry of `GET /deputados`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Legislator {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nome: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_partido: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sigla_uf: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id_legislatura: i64,
}

/// Entry of `GET /deputados/{id}/despesas`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ano: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mes: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tipo_despesa: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub valor_documento: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub valor_liquido: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nome_fornecedor: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cnpj_cpf_fornecedor: String,
    #[serde(
        default,
        alias = "numeroDocumento",
        deserialize_with = "null_as_default"
    )]
    pub num_documento: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_documento: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_documento: String,
}

// ============================================================================
// Collected and tracked records
// ============================================================================

/// Procedural status of a collected record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDetail {
    pub date: String,
    /// Latest procedural step, the field status changes are detected on
    pub procedure: String,
    pub dispatch: String,
    pub situation: String,
    pub body: String,
}

/// Yes/no/other count of a vote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub yes: u32,
    pub no: u32,
    pub other: u32,
}

impl VoteTally {
    /// `Some(true)` when yes wins, `Some(false)` when no wins, `None` on a tie.
    pub fn approved(&self) -> Option<bool> {
        if self.yes > self.no {
            Some(true)
        } else if self.no > self.yes {
            Some(false)
        } else {
            None
        }
    }

    pub fn result_label(&self) -> &'static str {
        match self.approved() {
            Some(true) => "Aprovado",
            Some(false) => "Rejeitado",
            None => "Sem resultado",
        }
    }
}

/// Deadline situation of a provisional decree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecreeUrgency {
    pub days_remaining: Option<i64>,
    pub level: u8,
    pub expired: bool,
}

/// Per-run output of a collector. Never persisted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedRecord {
    pub kind: EntityKind,
    pub id: ItemId,
    pub display_number: String,
    pub summary: String,
    pub presented_at: String,
    pub status: StatusDetail,
    pub importance: u8,
    pub category: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tally: Option<VoteTally>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<DecreeUrgency>,
}

impl CollectedRecord {
    /// Status string compared against `TrackedItem::last_known_status`
    pub fn current_status(&self) -> &str {
        &self.status.procedure
    }
}

/// An item selected for tracking, persisted in the run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: ItemId,
    #[serde(alias = "numero", default)]
    pub display_number: String,
    #[serde(alias = "last_status", default)]
    pub last_known_status: String,
    #[serde(alias = "categoria", default = "default_category")]
    pub category: String,
    #[serde(alias = "importancia", default = "default_importance")]
    pub importance: u8,
    #[serde(alias = "coletado_em", deserialize_with = "flexible_timestamp")]
    pub tracked_at: DateTime<Utc>,
    #[serde(default)]
    pub posted: bool,
}

fn default_category() -> String {
    crate::classifier::DEFAULT_CATEGORY.to_string()
}

fn default_importance() -> u8 {
    1
}

impl TrackedItem {
    /// Project a collected record into a freshly tracked item.
    pub fn from_record(record: &CollectedRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id.clone(),
            display_number: record.display_number.clone(),
            last_known_status: record.current_status().to_string(),
            category: record.category.clone(),
            importance: record.importance,
            tracked_at: now,
            posted: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_keeps_json_shape() {
        let numeric: ItemId = serde_json::from_str("2573075").unwrap();
        assert_eq!(numeric, ItemId::Numeric(2573075));
        let text: ItemId = serde_json::from_str("\"2438311-45\"").unwrap();
        assert_eq!(text, ItemId::Text("2438311-45".to_string()));
        assert_eq!(serde_json::to_string(&numeric).unwrap(), "2573075");
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let detail: PropositionDetail = serde_json::from_value(serde_json::json!({
            "id": 10,
            "siglaTipo": "PL",
            "numero": 5264,
            "ano": 2025,
            "ementa": null,
            "statusProposicao": null,
            "urlInteiroTeor": null
        }))
        .unwrap();
        assert_eq!(detail.ementa, "");
        assert_eq!(detail.status_proposicao.descricao_tramitacao, "");
        assert_eq!(detail.display_number(), "PL 5264/2025");
    }

    #[test]
    fn test_tracked_item_accepts_legacy_field_names() {
        let item: TrackedItem = serde_json::from_value(serde_json::json!({
            "id": 123,
            "numero": "PL 1000/2024",
            "last_status": "Apresentação de Proposição",
            "tracked_at": "2025-10-10T10:00:00+00:00",
            "posted": true,
            "importancia": 4,
            "categoria": "saúde"
        }))
        .unwrap();
        assert_eq!(item.display_number, "PL 1000/2024");
        assert_eq!(item.last_known_status, "Apresentação de Proposição");
        assert_eq!(item.importance, 4);
        assert_eq!(item.category, "saúde");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-10T14:30:00+00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-03-10T11:30:00-03:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-03-10T14:30").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-03-10T14:30:00.000123").unwrap().date_naive(), expected.date_naive());
        assert_eq!(
            parse_timestamp("2025-03-10").unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_timestamp("ontem"),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_snapshot_entries_load_as_tracked_items() {
        // vote snapshots written by the collection script carry coletado_em
        let item: TrackedItem = serde_json::from_value(serde_json::json!({
            "id": "2438311-45",
            "descricao": "Aprovada a Emenda",
            "importancia": 5,
            "coletado_em": "2025-10-12T09:15:42.123456"
        }))
        .unwrap();
        assert_eq!(item.id, ItemId::Text("2438311-45".to_string()));
        assert_eq!(item.display_number, "");
        assert_eq!(item.tracked_at.date_naive().to_string(), "2025-10-12");
    }

    #[test]
    fn test_author_label() {
        let full = Author {
            nome: "Maria Silva".to_string(),
            sigla_partido: "PT".to_string(),
            sigla_uf: "SP".to_string(),
        };
        assert_eq!(full.label().as_deref(), Some("Maria Silva (PT-SP)"));

        let bare = Author {
            nome: "Senado Federal".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.label().as_deref(), Some("Senado Federal"));
        assert_eq!(Author::default().label(), None);
    }

    #[test]
    fn test_vote_tally_result() {
        let tally = VoteTally { yes: 300, no: 100, other: 5 };
        assert_eq!(tally.approved(), Some(true));
        assert_eq!(tally.result_label(), "Aprovado");
        let tie = VoteTally { yes: 10, no: 10, other: 0 };
        assert_eq!(tie.approved(), None);
    }
}

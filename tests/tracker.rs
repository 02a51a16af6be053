use camarabot::prelude::*;
use camarabot::publish::{OutboxEntry, PostRef, PublishOutcome, ThreadOutcome};
use camarabot::reconcile::Veto;
use camarabot::types::ItemId;
use camarabot::{RunOutcome, RunState};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 18, 12, 0, 0).unwrap()
}

fn dados(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "dados": value }))
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

fn processor(server: &MockServer, dir: &TempDir) -> TrackerProcessor {
    let config = ConfigBuilder::new(dir.path())
        .base_url(server.uri())
        .timeout_secs(5)
        .retry(1, 0, 0)
        .throttle(0, 0)
        .build()
        .unwrap();
    TrackerProcessor::new(config).unwrap()
}

async fn mount_bills(server: &MockServer) {
    mount(server, "/proposicoes", dados(json!([{"id": 501}, {"id": 502}]))).await;
    mount(
        server,
        "/proposicoes/501",
        dados(json!({
            "id": 501,
            "siglaTipo": "PL",
            "numero": 5264,
            "ano": 2025,
            "ementa": "Altera a Lei do SUS para ampliar o atendimento em hospital público",
            "dataApresentacao": "2025-10-16T11:00",
            "statusProposicao": {
                "descricaoTramitacao": "Apresentação de Proposição",
                "descricaoSituacao": "Aguardando Despacho do Presidente",
                "siglaOrgao": "PLEN"
            },
            "urlInteiroTeor": "https://www.camara.leg.br/proposicoesWeb/prop_mostrarintegra?codteor=1"
        })),
    )
    .await;
    mount(
        server,
        "/proposicoes/502",
        dados(json!({
            "id": 502,
            "siglaTipo": "PL",
            "numero": 5265,
            "ano": 2025,
            "ementa": "Denomina viaduto na rodovia BR-101",
            "dataApresentacao": "2025-10-16T12:00",
            "statusProposicao": {"descricaoTramitacao": "Apresentação de Proposição"}
        })),
    )
    .await;
    mount(
        server,
        "/proposicoes/501/autores",
        dados(json!([{"nome": "Maria Silva", "siglaPartido": "PT", "siglaUf": "SP"}])),
    )
    .await;
}

fn outbox_entries(dir: &TempDir) -> Vec<OutboxEntry> {
    fs::read_to_string(dir.path().join("outbox.jsonl"))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_bill_run_publishes_then_vetoes_unimportant_leftover() {
    let server = MockServer::start().await;
    mount_bills(&server).await;
    let dir = TempDir::new().unwrap();
    let processor = processor(&server, &dir);

    let mut outbox = OutboxPublisher::open(&dir.path().join("outbox.jsonl")).unwrap();
    let first = processor
        .run_tracker(EntityKind::Bill, &mut outbox, now())
        .await
        .unwrap();

    assert_eq!(first.collected, 2);
    assert_eq!(first.new_count, 2);
    assert_eq!(first.selected.as_deref(), Some("PL 5264/2025"));
    assert!(matches!(
        first.outcome,
        RunOutcome::Published(ThreadOutcome::Posted { segments: 4, .. })
    ));

    let entries = outbox_entries(&dir);
    assert_eq!(entries.len(), 4);
    assert!(entries[0].text.starts_with("🆕 NOVO PROJETO DE LEI"));
    assert!(entries[2].text.contains("Maria Silva (PT-SP)"));
    assert!(entries.iter().all(|e| e.text.chars().count() <= 280));

    let state = RunState::load(&dir.path().join("estado.json")).unwrap();
    assert_eq!(state.tracked_projects.len(), 1);
    let tracked = &state.tracked_projects[0];
    assert_eq!(tracked.id, ItemId::Numeric(501));
    assert_eq!(tracked.last_known_status, "Apresentação de Proposição");
    assert_eq!(tracked.importance, 5);
    assert_eq!(tracked.category, "saúde");
    assert_eq!(tracked.tracked_at, now());

    // only the unimportant bill is new now, and it sits below the floor
    let second = processor
        .run_tracker(EntityKind::Bill, &mut outbox, now())
        .await
        .unwrap();
    assert_eq!(second.new_count, 1);
    assert_eq!(
        second.outcome,
        RunOutcome::Vetoed(Veto::BelowFloor { importance: 1, floor: 2 })
    );
    assert_eq!(outbox_entries(&dir).len(), 4);
    let state = RunState::load(&dir.path().join("estado.json")).unwrap();
    assert_eq!(state.tracked_projects.len(), 1);
}

/// Rejects every segment
struct Refusing;

impl Publisher for Refusing {
    fn publish(&mut self, _text: &str, _reply_to: Option<&PostRef>) -> camarabot::Result<PublishOutcome> {
        Ok(PublishOutcome::Failed("403 Forbidden".to_string()))
    }
}

#[tokio::test]
async fn test_failed_publish_leaves_state_untouched() {
    let server = MockServer::start().await;
    mount_bills(&server).await;
    let dir = TempDir::new().unwrap();
    let processor = processor(&server, &dir);

    let summary = processor
        .run_tracker(EntityKind::Bill, &mut Refusing, now())
        .await
        .unwrap();

    assert!(summary.failed());
    assert!(!dir.path().join("estado.json").exists());
}

#[tokio::test]
async fn test_expense_rotation_skips_idle_legislator_and_wraps() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/deputados",
        dados(json!([
            {"id": 1, "nome": "Ana Lima", "siglaPartido": "PT", "siglaUf": "SP"},
            {"id": 2, "nome": "Bruno Costa", "siglaPartido": "PL", "siglaUf": "RJ"}
        ])),
    )
    .await;
    mount(&server, "/deputados/1/despesas", dados(json!([]))).await;
    Mock::given(method("GET"))
        .and(path("/deputados/2/despesas"))
        .and(query_param("mes", "9"))
        .respond_with(dados(json!([
            {"ano": 2025, "mes": 9, "tipoDespesa": "TELEFONIA", "valorLiquido": 150.0, "nomeFornecedor": "OPERADORA"}
        ])))
        .mount(&server)
        .await;
    mount(&server, "/deputados/2/despesas", dados(json!([]))).await;

    let dir = TempDir::new().unwrap();
    let processor = processor(&server, &dir);
    let state_path = dir.path().join("estado.json");
    let mut dry_run = StdoutPublisher::with_writer(Vec::new());

    let first = processor.run_expenses(&mut dry_run, now()).await.unwrap();
    assert_eq!(first.selected.as_deref(), Some("Ana Lima (PT)"));
    assert!(matches!(first.outcome, RunOutcome::Skipped(_)));
    assert_eq!(RunState::load(&state_path).unwrap().last_processed_index, 1);

    let second = processor.run_expenses(&mut dry_run, now()).await.unwrap();
    assert_eq!(second.selected.as_deref(), Some("Bruno Costa (PL)"));
    assert!(matches!(
        second.outcome,
        RunOutcome::Published(ThreadOutcome::Posted { segments: 3, .. })
    ));
    assert_eq!(RunState::load(&state_path).unwrap().last_processed_index, 2);

    let printed = String::from_utf8(dry_run.into_inner()).unwrap();
    assert!(printed.contains("R$ 150,00"));

    // past the end of the list the rotation starts over
    let mut dry_run = StdoutPublisher::with_writer(Vec::new());
    let third = processor.run_expenses(&mut dry_run, now()).await.unwrap();
    assert_eq!(third.selected.as_deref(), Some("Ana Lima (PT)"));
    assert_eq!(RunState::load(&state_path).unwrap().last_processed_index, 1);
}

#[tokio::test]
async fn test_summary_counts_categories_without_touching_state() {
    let server = MockServer::start().await;
    mount_bills(&server).await;
    let dir = TempDir::new().unwrap();
    let processor = processor(&server, &dir);

    let mut dry_run = StdoutPublisher::with_writer(Vec::new());
    let summary = processor.run_summary(&mut dry_run, now()).await.unwrap();

    assert_eq!(summary.collected, 2);
    assert!(!summary.failed());
    assert!(!dir.path().join("estado.json").exists());
}

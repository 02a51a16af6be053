//! Thread formatting for publishing.
//!
//! Every formatter returns a fixed, small number of segments and every
//! segment is at most [`MAX_SEGMENT_CHARS`] characters long.

use crate::collectors::ExpenseSummary;
use crate::reconcile::ChangeKind;
use crate::types::{CollectedRecord, EntityKind};

/// Maximum length of one published segment, in characters
pub const MAX_SEGMENT_CHARS: usize = 280;

const ELLIPSIS: &str = "...";

const SOURCE_FOOTER: &str =
    "📋 Dados oficiais da Câmara dos Deputados\n#TransparenciaBrasil #Fiscalize";

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Icon for a category; unknown categories get the generic one.
pub fn category_emoji(category: &str) -> &'static str {
    match category {
        "economia" => "💰",
        "saúde" => "🏥",
        "educação" => "📚",
        "segurança" => "👮",
        "trabalho" => "👷",
        "meio ambiente" => "🌳",
        "previdência" => "👵",
        "emergência" => "🚨",
        "direitos" => "⚖️",
        _ => "📋",
    }
}

fn expense_emoji(category: &str) -> &'static str {
    match category {
        "Divulgação Da Atividade Parlamentar" => "📢",
        "Combustíveis E Lubrificantes" => "⛽",
        "Passagem Aérea - Sigepa" => "✈️",
        "Manutenção De Escritório De Apoio À Atividade Parlamentar" => "🏢",
        "Locação Ou Fretamento De Veículos Automotores" => "🚗",
        "Telefonia" => "📱",
        "Serviços Postais" => "✉️",
        _ => "▪️",
    }
}

fn stars(importance: u8) -> String {
    "⭐".repeat(importance.min(5) as usize)
}

/// Cut `text` to at most `max_chars`, preferring the last whitespace inside
/// the kept part, and append `suffix`.
///
/// ```
/// use camarabot::format::truncate_text;
/// assert_eq!(truncate_text("profissionais do magistério", 20, "..."), "profissionais do...");
/// ```
pub fn truncate_text(text: &str, max_chars: usize, suffix: &str) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let kept = take_chars(text, max_chars.saturating_sub(char_len(suffix)));
    let kept = match kept.rfind(char::is_whitespace) {
        Some(pos) if !kept[..pos].trim_end().is_empty() => kept[..pos].trim_end(),
        _ => kept,
    };
    format!("{}{}", kept, suffix)
}

/// Collapse whitespace and drop whole words from the end until the text
/// plus `placeholder` fits in `width` characters.
pub fn shorten(text: &str, width: usize, placeholder: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let collapsed = words.join(" ");
    if char_len(&collapsed) <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(char_len(placeholder));
    let mut out = String::new();
    let mut used = 0;
    for word in words {
        let needed = if out.is_empty() { char_len(word) } else { char_len(word) + 1 };
        if used + needed > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += needed;
    }

    if out.is_empty() {
        placeholder.trim_start().to_string()
    } else {
        out + placeholder
    }
}

/// Capitalize the first letter of every word and lowercase the rest.
/// A word starts at any letter not preceded by a letter.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Brazilian currency: `R$ 1.234,56`
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("R$ {}{},{:02}", sign, grouped, cents % 100)
}

fn bounded(segment: String) -> String {
    truncate_text(&segment, MAX_SEGMENT_CHARS, ELLIPSIS)
}

/// Summary segment: `prefix` followed by the summary shortened to fit.
fn summary_segment(prefix: &str, summary: &str) -> String {
    let summary = summary.trim().trim_matches('"');
    let width = MAX_SEGMENT_CHARS.saturating_sub(char_len(prefix) + 30);
    format!("{}{}", prefix, shorten(summary, width, ELLIPSIS))
}

fn status_change_lines(change: &ChangeKind) -> Option<String> {
    match change {
        ChangeKind::StatusChange { old, new } => Some(format!(
            "Status mudou:\n📍 De: {}\n📍 Para: {}",
            take_chars(old, 50),
            take_chars(new, 50)
        )),
        ChangeKind::New => None,
    }
}

fn authorship_segment(record: &CollectedRecord, authors: &[String]) -> String {
    let mut segment = String::new();
    if !authors.is_empty() {
        let mut names = authors.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
        if authors.len() > 2 {
            names.push_str(&format!(" e outros {}", authors.len() - 2));
        }
        segment.push_str(&format!("✍️ Autor(es):\n{}\n\n", names));
    }
    segment.push_str(&format!("📊 Status atual:\n{}", record.status.situation));
    if !record.status.body.is_empty() {
        segment.push_str(&format!("\n🏛️ Órgão: {}", record.status.body));
    }
    segment.push_str(&format!("\n\n🏷️ Tema: {}", title_case(&record.category)));
    segment
}

/// Four segments: headline, summary, authorship and status, link.
pub fn format_bill_thread(record: &CollectedRecord, authors: &[String], change: &ChangeKind) -> Vec<String> {
    let emoji = category_emoji(&record.category);
    let mut headline = match change {
        ChangeKind::StatusChange { .. } => "🔄 ATUALIZAÇÃO DE PROJETO DE LEI",
        ChangeKind::New => "🆕 NOVO PROJETO DE LEI",
    }
    .to_string();
    headline.push_str(&format!(
        "\n\n{} {}\n\n{}",
        emoji,
        record.display_number,
        stars(record.importance)
    ));
    if let Some(lines) = status_change_lines(change) {
        headline.push_str("\n\n");
        headline.push_str(&lines);
    }
    headline.push_str("\n\n👇 Siga o fio para detalhes\n#MonitorPL #ProjetoDeLei #Legislação");

    let link = format!(
        "🔗 Acompanhe a tramitação:\n{}\n\n{}",
        record.source_url, SOURCE_FOOTER
    );

    vec![
        headline,
        summary_segment("📄 O QUE O PROJETO QUER:\n\n", &record.summary),
        authorship_segment(record, authors),
        link,
    ]
    .into_iter()
    .map(bounded)
    .collect()
}

/// Four segments: headline with deadline, summary, authorship and status, link.
pub fn format_decree_thread(record: &CollectedRecord, authors: &[String], change: &ChangeKind) -> Vec<String> {
    let mut headline = match change {
        ChangeKind::StatusChange { .. } => "🔄 ATUALIZAÇÃO DE MEDIDA PROVISÓRIA",
        ChangeKind::New => "🆕 MEDIDA PROVISÓRIA EM TRAMITAÇÃO",
    }
    .to_string();
    headline.push_str(&format!(
        "\n\n{} {}\n\n{}",
        category_emoji(&record.category),
        record.display_number,
        stars(record.importance)
    ));
    if let Some(days) = record.urgency.and_then(|u| u.days_remaining) {
        if days < 0 {
            headline.push_str(&format!("\n\n⚠️ Prazo vencido há {} dias", -days));
        } else {
            headline.push_str(&format!("\n\n⏰ {} dias restantes para votação", days));
        }
    }
    if let Some(lines) = status_change_lines(change) {
        headline.push_str("\n\n");
        headline.push_str(&lines);
    }
    headline.push_str("\n\n👇 Siga o fio para detalhes\n#MonitorPL #MedidaProvisória");

    let link = format!(
        "🔗 Acompanhe a tramitação:\n{}\n\n{}",
        record.source_url, SOURCE_FOOTER
    );

    vec![
        headline,
        summary_segment("📄 O QUE A MEDIDA DETERMINA:\n\n", &record.summary),
        authorship_segment(record, authors),
        link,
    ]
    .into_iter()
    .map(bounded)
    .collect()
}

/// Four segments: headline with result, description, tally, link.
pub fn format_vote_thread(record: &CollectedRecord, change: &ChangeKind) -> Vec<String> {
    let tally = record.tally.unwrap_or_default();
    let result = match tally.approved() {
        Some(true) => "✅ APROVADO",
        Some(false) => "❌ REJEITADO",
        None => "⚖️ SEM RESULTADO DEFINIDO",
    };

    let mut headline = match change {
        ChangeKind::StatusChange { .. } => "🔄 ATUALIZAÇÃO DE VOTAÇÃO",
        ChangeKind::New => "🗳️ VOTAÇÃO NA CÂMARA",
    }
    .to_string();
    headline.push_str(&format!(
        "\n\n{}\n\n{}\n\n{}",
        record.display_number,
        stars(record.importance),
        result
    ));
    headline.push_str("\n\n👇 Siga o fio para detalhes\n#MonitorPL #Votação");

    let mut tally_segment = format!(
        "📊 Placar:\n✅ Sim: {}\n❌ Não: {}\n⚪ Outros: {}",
        tally.yes, tally.no, tally.other
    );
    if !record.status.body.is_empty() {
        tally_segment.push_str(&format!("\n\n🏛️ Órgão: {}", record.status.body));
    }
    if !record.status.date.is_empty() {
        tally_segment.push_str(&format!("\n📅 {}", take_chars(&record.status.date, 10)));
    }

    let link = format!("🔗 Saiba mais:\n{}\n\n{}", record.source_url, SOURCE_FOOTER);

    vec![
        headline,
        summary_segment("📄 O QUE FOI VOTADO:\n\n", &record.summary),
        tally_segment,
        link,
    ]
    .into_iter()
    .map(bounded)
    .collect()
}

/// Thread for any collected record
pub fn format_thread(record: &CollectedRecord, authors: &[String], change: &ChangeKind) -> Vec<String> {
    match record.kind {
        EntityKind::Bill => format_bill_thread(record, authors, change),
        EntityKind::Decree => format_decree_thread(record, authors, change),
        EntityKind::Vote => format_vote_thread(record, change),
    }
}

/// Three segments: total, largest categories, largest expense and link.
pub fn format_expense_thread(summary: &ExpenseSummary, months: u32) -> Vec<String> {
    let legislator = &summary.legislator;
    let headline = format!(
        "📊 Gastos Parlamentares: {}\n\nDeputado(a): {} ({}) utilizou este valor da cota parlamentar nos últimos {} meses.\n\n👇 Siga o fio para ver os detalhes e as fontes.\n\n#MonitorPL #TransparenciaBrasil #Fiscalize #Governo #GastosPúblicos",
        format_currency(summary.total),
        legislator.nome,
        legislator.sigla_partido,
        months
    );

    let mut details = String::from("🧵 Detalhes dos Gastos:\n\n");
    let mut listed = 0;
    for (category, value) in &summary.by_category {
        if listed == 5 {
            break;
        }
        let line = format!("{} {}: {}\n", expense_emoji(category), category, format_currency(*value));
        if char_len(&details) + char_len(&line) < MAX_SEGMENT_CHARS {
            details.push_str(&line);
            listed += 1;
        }
    }

    let mut closing = String::new();
    if let Some(largest) = summary.largest.as_ref().filter(|e| e.valor_liquido > 0.0) {
        closing.push_str(&format!(
            "✨ Destaque: O maior gasto único foi de {} com \"{}\".\n\n",
            format_currency(largest.valor_liquido),
            title_case(&largest.nome_fornecedor)
        ));
    }
    closing.push_str(&format!(
        "📊 Acompanhe os gastos completos em:\nhttps://www.camara.leg.br/deputados/{}\n\n#DadosAbertos",
        legislator.id
    ));

    vec![headline, details.trim_end().to_string(), closing]
        .into_iter()
        .map(bounded)
        .collect()
}

/// Weekly digest: totals, the five largest categories, call to action.
pub fn format_summary_thread(total: usize, important: usize, categories: &[(String, usize)]) -> Vec<String> {
    let mut thread = vec![format!(
        "📊 RESUMO SEMANAL - PROJETOS DE LEI\n\n🔢 Total analisado: {}\n⭐ Importantes: {}\n\n👇 Veja os detalhes\n#MonitorPL",
        total, important
    )];

    if !categories.is_empty() {
        let mut sorted = categories.to_vec();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        let mut by_theme = String::from("📋 PROJETOS POR TEMA:\n\n");
        for (category, count) in sorted.iter().take(5) {
            by_theme.push_str(&format!(
                "{} {}: {}\n",
                category_emoji(category),
                title_case(category),
                count
            ));
        }
        thread.push(by_theme.trim_end().to_string());
    }

    thread.push(
        "💡 Quer saber sobre algum projeto específico?\n\nTodos os dados são públicos e verificáveis.\n\n🔗 camara.leg.br\n\n#TransparênciaBrasil #Fiscalize"
            .to_string(),
    );

    thread.into_iter().map(bounded).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecreeUrgency, ItemId, Legislator, StatusDetail, VoteTally, Expense};

    fn bill() -> CollectedRecord {
        CollectedRecord {
            kind: EntityKind::Bill,
            id: ItemId::Numeric(2573075),
            display_number: "PL 5264/2025".to_string(),
            summary: "Altera a legislação para incluir os profissionais do magistério da \
                      educação básica no rol de categorias com direito a adicionais de \
                      insalubridade e/ou periculosidade, conforme o caso."
                .to_string(),
            presented_at: "2025-10-16T18:51".to_string(),
            status: StatusDetail {
                date: "2025-10-16T18:51".to_string(),
                procedure: "Apresentação de Proposição".to_string(),
                dispatch: "Apresentação do PL".to_string(),
                situation: "Aguardando análise".to_string(),
                body: "MESA".to_string(),
            },
            importance: 4,
            category: "educação".to_string(),
            source_url: "https://www.camara.leg.br/proposicoesWeb/fichadetramitacao?idProposicao=2573075"
                .to_string(),
            full_text_url: None,
            authors: Vec::new(),
            tally: None,
            urgency: None,
        }
    }

    #[test]
    fn test_truncate_keeps_whole_words() {
        assert_eq!(truncate_text("profissionais do magistério", 20, "..."), "profissionais do...");
        assert_eq!(truncate_text("curto", 20, "..."), "curto");
        // no space in the window: hard cut
        assert_eq!(truncate_text("inconstitucionalidade", 10, "..."), "inconst...");
        assert_eq!(truncate_text("Órgão:\nPLENARIOCOMISSAO", 12, "..."), "Órgão:...");
        assert_eq!(truncate_text("Situação: \n\tAguardando", 16, "..."), "Situação:...");
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "ação ".repeat(100);
        let cut = truncate_text(&text, 280, "...");
        assert!(cut.chars().count() <= 280);
        assert!(cut.ends_with("ação..."));
    }

    #[test]
    fn test_shorten_collapses_whitespace() {
        assert_eq!(shorten("  Dispõe   sobre\n o  SUS ", 50, "..."), "Dispõe sobre o SUS");
        assert_eq!(shorten("um dois três quatro", 12, "..."), "um dois...");
        assert_eq!(shorten("anticonstitucionalissimamente", 5, "..."), "...");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("meio ambiente"), "Meio Ambiente");
        assert_eq!(title_case("PASSAGEM AÉREA - SIGEPA"), "Passagem Aérea - Sigepa");
        assert_eq!(title_case("saúde"), "Saúde");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1234.56), "R$ 1.234,56");
        assert_eq!(format_currency(0.0), "R$ 0,00");
        assert_eq!(format_currency(999.999), "R$ 1.000,00");
        assert_eq!(format_currency(1234567.8), "R$ 1.234.567,80");
        assert_eq!(format_currency(-50.5), "R$ -50,50");
    }

    #[test]
    fn test_bill_thread_new() {
        let authors = vec![
            "Dr. Fernando Máximo (UNIÃO-RO)".to_string(),
            "Maria Silva (PT-SP)".to_string(),
            "João Souza (PL-MG)".to_string(),
        ];
        let thread = format_bill_thread(&bill(), &authors, &ChangeKind::New);
        assert_eq!(thread.len(), 4);
        assert!(thread[0].starts_with("🆕 NOVO PROJETO DE LEI\n\n📚 PL 5264/2025\n\n⭐⭐⭐⭐"));
        assert!(thread[1].starts_with("📄 O QUE O PROJETO QUER:\n\nAltera a legislação"));
        assert!(thread[2].contains("Dr. Fernando Máximo (UNIÃO-RO), Maria Silva (PT-SP) e outros 1"));
        assert!(thread[2].contains("🏛️ Órgão: MESA"));
        assert!(thread[2].ends_with("🏷️ Tema: Educação"));
        assert!(thread[3].contains("idProposicao=2573075"));
        for segment in &thread {
            assert!(segment.chars().count() <= MAX_SEGMENT_CHARS);
        }
    }

    #[test]
    fn test_bill_thread_status_change() {
        let change = ChangeKind::StatusChange {
            old: "Apresentação de Proposição".to_string(),
            new: "Aprovado em Comissão".to_string(),
        };
        let thread = format_bill_thread(&bill(), &[], &change);
        assert!(thread[0].starts_with("🔄 ATUALIZAÇÃO DE PROJETO DE LEI"));
        assert!(thread[0].contains("📍 De: Apresentação de Proposição\n📍 Para: Aprovado em Comissão"));
        assert!(!thread[2].contains("Autor(es)"));
    }

    #[test]
    fn test_long_summary_is_bounded() {
        let mut record = bill();
        record.summary = "palavra ".repeat(200);
        record.display_number = "X".repeat(400);
        for segment in format_thread(&record, &[], &ChangeKind::New) {
            assert!(segment.chars().count() <= MAX_SEGMENT_CHARS);
        }
    }

    #[test]
    fn test_unknown_category_uses_generic_icon() {
        assert_eq!(category_emoji("astronomia"), "📋");
        assert_eq!(category_emoji("diversos"), "📋");
        assert_eq!(category_emoji("saúde"), "🏥");
    }

    #[test]
    fn test_decree_thread_mentions_deadline() {
        let mut record = bill();
        record.kind = EntityKind::Decree;
        record.display_number = "MPV 1300/2025".to_string();
        record.urgency = Some(DecreeUrgency { days_remaining: Some(-3), level: 5, expired: true });
        let thread = format_thread(&record, &[], &ChangeKind::New);
        assert!(thread[0].contains("⚠️ Prazo vencido há 3 dias"));
    }

    #[test]
    fn test_vote_thread() {
        let mut record = bill();
        record.kind = EntityKind::Vote;
        record.display_number = "PEC 45/2019".to_string();
        record.summary = "Aprovada a Proposta de Emenda à Constituição".to_string();
        record.tally = Some(VoteTally { yes: 382, no: 118, other: 3 });
        let thread = format_thread(&record, &[], &ChangeKind::New);
        assert_eq!(thread.len(), 4);
        assert!(thread[0].contains("✅ APROVADO"));
        assert!(thread[2].starts_with("📊 Placar:\n✅ Sim: 382\n❌ Não: 118\n⚪ Outros: 3"));
    }

    #[test]
    fn test_expense_thread() {
        let summary = ExpenseSummary {
            legislator: Legislator {
                id: 204554,
                nome: "Fulana de Tal".to_string(),
                sigla_partido: "PSD".to_string(),
                ..Default::default()
            },
            total: 1850.0,
            by_category: vec![
                ("Passagem Aérea - Sigepa".to_string(), 1200.5),
                ("Combustíveis E Lubrificantes".to_string(), 550.0),
            ],
            largest: Some(Expense {
                valor_liquido: 1200.5,
                nome_fornecedor: "CIA AEREA".to_string(),
                ..Default::default()
            }),
        };
        let thread = format_expense_thread(&summary, 3);
        assert_eq!(thread.len(), 3);
        assert!(thread[0].starts_with("📊 Gastos Parlamentares: R$ 1.850,00"));
        assert_eq!(
            thread[1],
            "🧵 Detalhes dos Gastos:\n\n✈️ Passagem Aérea - Sigepa: R$ 1.200,50\n⛽ Combustíveis E Lubrificantes: R$ 550,00"
        );
        assert!(thread[2].contains("R$ 1.200,50 com \"Cia Aerea\""));
        assert!(thread[2].contains("https://www.camara.leg.br/deputados/204554"));
    }

    #[test]
    fn test_summary_thread_top_five() {
        let categories: Vec<(String, usize)> = vec![
            ("diversos".to_string(), 2),
            ("saúde".to_string(), 9),
            ("economia".to_string(), 7),
            ("trabalho".to_string(), 1),
            ("educação".to_string(), 4),
            ("segurança".to_string(), 3),
        ];
        let thread = format_summary_thread(26, 8, &categories);
        assert_eq!(thread.len(), 3);
        insta::assert_snapshot!(thread[1], @r###"
        📋 PROJETOS POR TEMA:

        🏥 Saúde: 9
        💰 Economia: 7
        📚 Educação: 4
        👮 Segurança: 3
        📋 Diversos: 2
        "###);
        assert_eq!(format_summary_thread(0, 0, &[]).len(), 2);
    }
}

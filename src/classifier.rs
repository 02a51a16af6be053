//! Keyword ranking of summary texts.
//!
//! A classifier is an ordered list of importance tiers plus an ordered list
//! of categories. Matching is case-insensitive substring search and the
//! first hit wins in declaration order, so the order of every list here is
//! part of the behaviour.

use serde::{Deserialize, Serialize};

/// Category returned when no category keyword matches
pub const DEFAULT_CATEGORY: &str = "diversos";

/// `(importance, category)` derived from a summary text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub importance: u8,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tier {
    importance: u8,
    keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordClassifier {
    tiers: Vec<Tier>,
    floor: u8,
    categories: Vec<(String, Vec<String>)>,
}

fn lowered(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}

impl KeywordClassifier {
    /// Empty classifier: every text gets `floor` and the default category.
    pub fn new(floor: u8) -> Self {
        Self {
            tiers: Vec::new(),
            floor,
            categories: Vec::new(),
        }
    }

    /// Append an importance tier. Tiers are scanned in the order added.
    pub fn tier(mut self, importance: u8, keywords: &[&str]) -> Self {
        self.tiers.push(Tier {
            importance,
            keywords: lowered(keywords),
        });
        self
    }

    /// Append a category. Categories are scanned in the order added.
    pub fn category(mut self, name: &str, keywords: &[&str]) -> Self {
        self.categories.push((name.to_string(), lowered(keywords)));
        self
    }

    pub fn floor(&self) -> u8 {
        self.floor
    }

    /// Incremental bill tracker: 5 / 3 / floor 1.
    pub fn bills() -> Self {
        Self::new(1)
            .tier(
                5,
                &[
                    "constituição",
                    "código penal",
                    "código civil",
                    "reforma tributária",
                    "previdência",
                    "sus",
                    "salário mínimo",
                    "educação básica",
                    "segurança pública",
                    "meio ambiente",
                ],
            )
            .tier(
                3,
                &[
                    "imposto",
                    "trabalho",
                    "servidor público",
                    "aposentadoria",
                    "saúde",
                    "escola",
                    "universidade",
                    "polícia",
                ],
            )
            .category(
                "economia",
                &["imposto", "tributário", "orçamento", "fiscal", "financeiro"],
            )
            .category(
                "saúde",
                &["sus", "saúde", "medicamento", "vacina", "hospital"],
            )
            .category(
                "educação",
                &["educação", "escola", "universidade", "professor", "ensino"],
            )
            .category(
                "segurança",
                &["segurança", "polícia", "crime", "penal", "prisão"],
            )
            .category(
                "trabalho",
                &["trabalho", "trabalhador", "emprego", "salário", "clt"],
            )
            .category(
                "meio ambiente",
                &["meio ambiente", "ambiental", "clima", "desmatamento"],
            )
    }

    /// Provisional decrees: 5 / 3 / floor 2.
    pub fn decrees() -> Self {
        Self::new(2)
            .tier(
                5,
                &[
                    "orçamento",
                    "tributário",
                    "imposto",
                    "tributo",
                    "previdência",
                    "salário mínimo",
                    "reforma",
                    "calamidade",
                    "emergência",
                    "crédito extraordinário",
                ],
            )
            .tier(
                3,
                &[
                    "servidor público",
                    "funcionalismo",
                    "educação",
                    "saúde",
                    "segurança",
                    "transporte",
                    "infraestrutura",
                ],
            )
            .category(
                "economia",
                &["orçamento", "tributário", "imposto", "fiscal", "financeiro", "tributo"],
            )
            .category("previdência", &["previdência", "aposentadoria", "inss"])
            .category("saúde", &["saúde", "sus", "medicamento"])
            .category("educação", &["educação", "escola", "universidade"])
            .category("emergência", &["calamidade", "emergência", "extraordinário"])
            .category("trabalho", &["trabalho", "trabalhador", "salário"])
    }

    /// Plenary votes: 5 / 3 / floor 2, no categories.
    pub fn votes() -> Self {
        Self::new(2)
            .tier(
                5,
                &[
                    "reforma",
                    "constituição",
                    "emenda constitucional",
                    "pec",
                    "orçamento",
                    "ldo",
                    "loa",
                    "medida provisória",
                    "mp",
                    "código penal",
                    "código civil",
                ],
            )
            .tier(
                3,
                &[
                    "projeto de lei",
                    "pl ",
                    "imposto",
                    "tributo",
                    "saúde",
                    "educação",
                    "segurança",
                ],
            )
    }

    /// Historical bill backfill: 5 / 4 / 3 / floor 2, with a category table
    /// that also accepts unaccented spellings.
    pub fn historical_bills() -> Self {
        Self::new(2)
            .tier(5, &["constituição", "reforma", "código", "previdência"])
            .tier(4, &["saúde", "educação", "segurança", "trabalho"])
            .tier(3, &["imposto", "tributo", "servidor"])
            .category(
                "educação",
                &["educação", "educacao", "escola", "professor", "universidade", "ensino"],
            )
            .category(
                "saúde",
                &["saúde", "saude", "sus", "hospital", "medicamento", "médico", "medico"],
            )
            .category(
                "economia",
                &["imposto", "tributário", "tributario", "economia", "financeiro", "crédito", "credito"],
            )
            .category(
                "segurança",
                &["segurança", "seguranca", "polícia", "policia", "crime", "penal", "prisão", "prisao"],
            )
            .category(
                "trabalho",
                &["trabalho", "trabalhador", "emprego", "salário", "salario", "clt"],
            )
            .category(
                "meio ambiente",
                &["meio ambiente", "ambiental", "clima", "desmatamento", "preservação", "preservacao"],
            )
            .category(
                "direitos",
                &["direitos", "mulher", "criança", "crianca", "idoso", "negro", "lgbt", "inclusão", "inclusao"],
            )
    }

    /// Importance of the first tier with a keyword found in any of `texts`.
    pub fn importance_of(&self, texts: &[&str]) -> u8 {
        let texts: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
        self.tiers
            .iter()
            .find(|tier| {
                tier.keywords
                    .iter()
                    .any(|kw| texts.iter().any(|t| t.contains(kw.as_str())))
            })
            .map(|tier| tier.importance)
            .unwrap_or(self.floor)
    }

    /// First category with a keyword found in any of `texts`.
    pub fn category_of(&self, texts: &[&str]) -> &str {
        let texts: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
        self.categories
            .iter()
            .find(|(_, keywords)| {
                keywords
                    .iter()
                    .any(|kw| texts.iter().any(|t| t.contains(kw.as_str())))
            })
            .map(|(name, _)| name.as_str())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn classify(&self, summary: &str) -> Classification {
        self.classify_any(&[summary])
    }

    /// Classify a record described by several texts, e.g. a vote's
    /// description and the number of the bill it decides on.
    pub fn classify_any(&self, texts: &[&str]) -> Classification {
        Classification {
            importance: self.importance_of(texts),
            category: self.category_of(texts).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_tier_wins_over_medium() {
        let classifier = KeywordClassifier::bills();
        // "imposto" is medium, "previdência" is high
        let result = classifier.classify("Altera o imposto de renda e a Previdência Social");
        assert_eq!(result.importance, 5);
        assert_eq!(result.category, "economia");
    }

    #[test]
    fn test_no_match_gives_floor_and_default_category() {
        let text = "Denomina viaduto na rodovia BR-101";
        let bills = KeywordClassifier::bills().classify(text);
        assert_eq!(bills.importance, 1);
        assert_eq!(bills.category, DEFAULT_CATEGORY);

        let decrees = KeywordClassifier::decrees().classify(text);
        assert_eq!(decrees.importance, 2);
        assert_eq!(decrees.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let result = KeywordClassifier::bills().classify("DISPÕE SOBRE A SAÚDE DA FAMÍLIA");
        assert_eq!(result.importance, 3);
        assert_eq!(result.category, "saúde");
    }

    #[test]
    fn test_category_declaration_order_breaks_ties() {
        // matches both economia ("imposto") and educação ("escola")
        let result = KeywordClassifier::bills().classify("Isenta de imposto a escola comunitária");
        assert_eq!(result.category, "economia");
    }

    #[test]
    fn test_decree_tiers() {
        let classifier = KeywordClassifier::decrees();
        let result = classifier.classify("Abre crédito extraordinário em favor do Ministério");
        assert_eq!(result.importance, 5);
        assert_eq!(result.category, "emergência");

        let result = classifier.classify("Reestrutura carreiras do funcionalismo");
        assert_eq!(result.importance, 3);
    }

    #[test]
    fn test_vote_checks_every_text() {
        let classifier = KeywordClassifier::votes();
        let result = classifier.classify_any(&["Aprovado o requerimento", "PEC 45/2019"]);
        assert_eq!(result.importance, 5);
        assert_eq!(result.category, DEFAULT_CATEGORY);

        let result = classifier.classify_any(&["Requerimento de retirada de pauta", ""]);
        assert_eq!(result.importance, 2);
    }

    #[test]
    fn test_historical_tiers_and_unaccented_categories() {
        let classifier = KeywordClassifier::historical_bills();
        assert_eq!(classifier.classify("Altera o Código de Trânsito").importance, 5);
        assert_eq!(classifier.classify("Programa de saúde bucal").importance, 4);
        assert_eq!(classifier.classify("Carreira do servidor").importance, 3);
        assert_eq!(classifier.classify("Institui o dia do ciclista").importance, 2);
        assert_eq!(
            classifier.classify("Protecao a crianca e ao idoso").category,
            "direitos"
        );
        assert_eq!(classifier.classify("Merenda na educacao").category, "educação");
    }

    #[test]
    fn test_custom_classifier() {
        let classifier = KeywordClassifier::new(1)
            .tier(4, &["Ferrovia"])
            .category("transporte", &["ferrovia", "rodovia"]);
        let result = classifier.classify("Concessão de ferrovia");
        assert_eq!(result, Classification { importance: 4, category: "transporte".to_string() });
        assert_eq!(classifier.floor(), 1);
    }
}

//! SQLite store for long-horizon historical data.
//!
//! Rows are keyed by the API's own ids: bills, votes, decrees and
//! legislators are replaced on conflict, expenses and ballots are only ever
//! inserted once. `coleta_historica` records one row per backfill unit so an
//! interrupted run can be told apart from a finished one.

use crate::error::Result;
use crate::types::{DecreeUrgency, Expense, Legislator, VoteTally};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS deputados (
    id INTEGER PRIMARY KEY,
    nome TEXT NOT NULL,
    partido TEXT,
    uf TEXT,
    email TEXT,
    legislatura_atual INTEGER,
    data_ultima_coleta TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS gastos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    deputado_id INTEGER NOT NULL REFERENCES deputados(id),
    ano INTEGER NOT NULL,
    mes INTEGER NOT NULL,
    tipo_despesa TEXT,
    valor_documento REAL,
    valor_liquido REAL,
    fornecedor TEXT,
    cnpj_fornecedor TEXT,
    numero_documento TEXT,
    data_documento TEXT,
    url_documento TEXT,
    UNIQUE (deputado_id, ano, mes, numero_documento, valor_liquido, fornecedor)
);
CREATE INDEX IF NOT EXISTS idx_gastos_deputado_periodo ON gastos (deputado_id, ano, mes);

CREATE TABLE IF NOT EXISTS projetos_lei (
    id INTEGER PRIMARY KEY,
    numero TEXT NOT NULL,
    ano INTEGER,
    ementa TEXT,
    autor_nome TEXT,
    tipo TEXT,
    data_apresentacao TEXT,
    status TEXT,
    categoria TEXT,
    importancia INTEGER,
    url TEXT
);
CREATE INDEX IF NOT EXISTS idx_projetos_lei_ano ON projetos_lei (ano);

CREATE TABLE IF NOT EXISTS votacoes (
    id TEXT PRIMARY KEY,
    data_hora_registro TEXT,
    descricao TEXT,
    sigla_orgao TEXT,
    aprovacao INTEGER,
    votos_sim INTEGER NOT NULL DEFAULT 0,
    votos_nao INTEGER NOT NULL DEFAULT 0,
    votos_outros INTEGER NOT NULL DEFAULT 0,
    importancia INTEGER,
    proposicao_id INTEGER,
    proposicao_numero TEXT,
    data_ultima_coleta TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS votos_deputados (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    votacao_id TEXT NOT NULL REFERENCES votacoes(id),
    deputado_id INTEGER NOT NULL,
    tipo_voto TEXT,
    UNIQUE (votacao_id, deputado_id)
);

CREATE TABLE IF NOT EXISTS medidas_provisorias (
    id INTEGER PRIMARY KEY,
    numero TEXT NOT NULL,
    ementa TEXT,
    data_apresentacao TEXT,
    status TEXT,
    dias_restantes INTEGER,
    prazo_vencido INTEGER NOT NULL DEFAULT 0,
    nivel_urgencia INTEGER,
    importancia INTEGER,
    categoria TEXT,
    data_ultima_coleta TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS coleta_historica (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tipo TEXT NOT NULL,
    ano INTEGER NOT NULL,
    mes INTEGER,
    status TEXT NOT NULL CHECK (status IN ('in_progress', 'completed', 'error')),
    total_registros INTEGER NOT NULL DEFAULT 0,
    erro TEXT,
    started_at TEXT DEFAULT CURRENT_TIMESTAMP,
    completed_at TEXT
);
"#;

const TABLES: [&str; 7] = [
    "coleta_historica",
    "votos_deputados",
    "votacoes",
    "gastos",
    "deputados",
    "projetos_lei",
    "medidas_provisorias",
];

/// A bill as stored by the historical backfill
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillRow {
    pub id: i64,
    /// `"PL 1234/2024"`
    pub display_number: String,
    pub year: i32,
    pub summary: String,
    pub author: String,
    pub kind: String,
    pub presented_at: String,
    pub status: String,
    pub category: String,
    pub importance: u8,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteRow {
    pub id: String,
    pub registered_at: String,
    pub description: String,
    pub body: String,
    pub tally: VoteTally,
    pub importance: u8,
    pub proposition_id: Option<i64>,
    pub proposition_label: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecreeRow {
    pub id: i64,
    pub display_number: String,
    pub summary: String,
    pub presented_at: String,
    pub status: String,
    pub urgency: DecreeUrgency,
    pub importance: u8,
    pub category: String,
}

/// Row counts and the summed expense value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub legislators: i64,
    pub expenses: i64,
    pub expense_total: f64,
    pub bills: i64,
    pub votes: i64,
    pub ballots: i64,
    pub decrees: i64,
    pub unfinished_collections: i64,
}

/// One `coleta_historica` row
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRun {
    pub id: i64,
    pub kind: String,
    pub year: i32,
    pub month: Option<u32>,
    pub status: String,
    pub records: i64,
    pub error: Option<String>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.display(), "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Drop every table and recreate the empty schema.
    pub fn reset(&self) -> Result<()> {
        warn!("dropping all tables");
        for table in TABLES {
            self.conn
                .execute_batch(&format!("DROP TABLE IF EXISTS {};", table))?;
        }
        self.init_schema()?;
        info!("schema recreated");
        Ok(())
    }

    /// Run `f` inside one transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    pub fn upsert_legislator(&self, legislator: &Legislator) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO deputados
                (id, nome, partido, uf, email, legislatura_atual, data_ultima_coleta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)",
            params![
                legislator.id,
                legislator.nome,
                legislator.sigla_partido,
                legislator.sigla_uf,
                legislator.email,
                legislator.id_legislatura,
            ],
        )?;
        Ok(())
    }

    /// Insert one expense; `false` when an identical row is already stored.
    pub fn insert_expense(&self, legislator_id: i64, expense: &Expense) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO gastos
                (deputado_id, ano, mes, tipo_despesa, valor_documento, valor_liquido,
                 fornecedor, cnpj_fornecedor, numero_documento, data_documento, url_documento)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                legislator_id,
                expense.ano,
                expense.mes,
                expense.tipo_despesa,
                expense.valor_documento,
                expense.valor_liquido,
                expense.nome_fornecedor,
                expense.cnpj_cpf_fornecedor,
                expense.num_documento,
                expense.data_documento,
                expense.url_documento,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn upsert_bill(&self, bill: &BillRow) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO projetos_lei
                (id, numero, ano, ementa, autor_nome, tipo, data_apresentacao,
                 status, categoria, importancia, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                bill.id,
                bill.display_number,
                bill.year,
                bill.summary,
                bill.author,
                bill.kind,
                bill.presented_at,
                bill.status,
                bill.category,
                bill.importance,
                bill.url,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_vote(&self, vote: &VoteRow) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO votacoes
                (id, data_hora_registro, descricao, sigla_orgao, aprovacao,
                 votos_sim, votos_nao, votos_outros, importancia,
                 proposicao_id, proposicao_numero, data_ultima_coleta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, CURRENT_TIMESTAMP)",
            params![
                vote.id,
                vote.registered_at,
                vote.description,
                vote.body,
                vote.tally.approved(),
                vote.tally.yes,
                vote.tally.no,
                vote.tally.other,
                vote.importance,
                vote.proposition_id,
                vote.proposition_label,
            ],
        )?;
        Ok(())
    }

    /// A legislator's ballot in a vote; the first one recorded is kept.
    pub fn insert_ballot(&self, vote_id: &str, legislator_id: i64, kind: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO votos_deputados (votacao_id, deputado_id, tipo_voto)
             VALUES (?1, ?2, ?3)",
            params![vote_id, legislator_id, kind],
        )?;
        Ok(inserted > 0)
    }

    pub fn upsert_decree(&self, decree: &DecreeRow) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO medidas_provisorias
                (id, numero, ementa, data_apresentacao, status, dias_restantes,
                 prazo_vencido, nivel_urgencia, importancia, categoria, data_ultima_coleta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, CURRENT_TIMESTAMP)",
            params![
                decree.id,
                decree.display_number,
                decree.summary,
                decree.presented_at,
                decree.status,
                decree.urgency.days_remaining,
                decree.urgency.expired,
                decree.urgency.level,
                decree.importance,
                decree.category,
            ],
        )?;
        Ok(())
    }

    /// Open an audit row for one unit of a backfill and return its id.
    pub fn start_collection(&self, kind: &str, year: i32, month: Option<u32>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO coleta_historica (tipo, ano, mes, status, started_at)
             VALUES (?1, ?2, ?3, 'in_progress', CURRENT_TIMESTAMP)",
            params![kind, year, month],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn complete_collection(&self, run_id: i64, records: usize) -> Result<()> {
        self.conn.execute(
            "UPDATE coleta_historica
             SET status = 'completed', total_registros = ?2, completed_at = CURRENT_TIMESTAMP
             WHERE id = ?1 AND status = 'in_progress'",
            params![run_id, records as i64],
        )?;
        Ok(())
    }

    pub fn fail_collection(&self, run_id: i64, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE coleta_historica
             SET status = 'error', erro = ?2, completed_at = CURRENT_TIMESTAMP
             WHERE id = ?1",
            params![run_id, error],
        )?;
        Ok(())
    }

    pub fn collection_run(&self, run_id: i64) -> Result<Option<CollectionRun>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, tipo, ano, mes, status, total_registros, erro
                 FROM coleta_historica WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(CollectionRun {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        year: row.get(2)?,
                        month: row.get(3)?,
                        status: row.get(4)?,
                        records: row.get(5)?,
                        error: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    pub fn statistics(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        Ok(StoreStats {
            legislators: count("SELECT COUNT(*) FROM deputados")?,
            expenses: count("SELECT COUNT(*) FROM gastos")?,
            expense_total: self.conn.query_row(
                "SELECT COALESCE(SUM(valor_liquido), 0.0) FROM gastos",
                [],
                |row| row.get(0),
            )?,
            bills: count("SELECT COUNT(*) FROM projetos_lei")?,
            votes: count("SELECT COUNT(*) FROM votacoes")?,
            ballots: count("SELECT COUNT(*) FROM votos_deputados")?,
            decrees: count("SELECT COUNT(*) FROM medidas_provisorias")?,
            unfinished_collections: count(
                "SELECT COUNT(*) FROM coleta_historica WHERE status = 'in_progress'",
            )?,
        })
    }
}

//! Reconciliation of freshly collected records against tracked state.
//!
//! One run goes: prune expired tracked items, split collected records into
//! new and known, keep the known ones whose status moved to a pivotal
//! stage, select at most one record, apply the posting gate and upsert the
//! selection into the tracked list.

use crate::config::TrackerSettings;
use crate::types::{CollectedRecord, ItemId, TrackedItem};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// A status change counts only when the new status contains one of these
pub const IMPORTANT_STATUS_KEYWORDS: [&str; 9] = [
    "aprovado",
    "rejeitado",
    "arquivado",
    "sancionado",
    "vetado",
    "plenário",
    "votação",
    "urgência",
    "promulgado",
];

/// Why a record was selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    StatusChange { old: String, new: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub record: CollectedRecord,
    pub change: ChangeKind,
}

/// Reason the posting gate refused a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Veto {
    DailyLimit { posted_today: usize, max: usize },
    BelowFloor { importance: u8, floor: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub retention_days: i64,
    pub min_importance: u8,
    pub max_posts_per_day: usize,
    pub posting_floor: u8,
}

impl From<&TrackerSettings> for ReconcilePolicy {
    fn from(settings: &TrackerSettings) -> Self {
        Self {
            retention_days: settings.retention_days,
            min_importance: settings.min_importance,
            max_posts_per_day: settings.max_posts_per_day,
            posting_floor: settings.posting_floor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The record to publish, if any survived selection and the gate
    pub selected: Option<Selection>,
    /// Pruned tracked list, with the selection upserted when there is one
    pub updated_tracked: Vec<TrackedItem>,
    pub pruned: usize,
    pub new_count: usize,
    pub changed_count: usize,
    pub veto: Option<Veto>,
}

/// Drop items tracked before `now - retention_days`.
pub fn prune(tracked: &[TrackedItem], retention_days: i64, now: DateTime<Utc>) -> Vec<TrackedItem> {
    let cutoff = now - Duration::days(retention_days);
    tracked
        .iter()
        .filter(|item| {
            let keep = item.tracked_at >= cutoff;
            if !keep {
                info!(id = %item.id, number = %item.display_number, "pruning expired tracked item");
            }
            keep
        })
        .cloned()
        .collect()
}

/// Collected records whose id is not tracked, in input order.
pub fn filter_new<'a>(collected: &'a [CollectedRecord], tracked: &[TrackedItem]) -> Vec<&'a CollectedRecord> {
    let tracked_ids: HashSet<&ItemId> = tracked.iter().map(|item| &item.id).collect();
    collected
        .iter()
        .filter(|record| !tracked_ids.contains(&record.id))
        .collect()
}

/// Whether moving to `new_status` is worth surfacing. Only the new status
/// is inspected.
pub fn is_important_status_change(_old_status: &str, new_status: &str) -> bool {
    let new_status = new_status.to_lowercase();
    IMPORTANT_STATUS_KEYWORDS
        .iter()
        .any(|keyword| new_status.contains(keyword))
}

/// Tracked records whose non-empty current status differs from the last
/// known one and reached a pivotal stage, in input order.
pub fn detect_status_changes<'a>(
    collected: &'a [CollectedRecord],
    tracked: &[TrackedItem],
) -> Vec<(&'a CollectedRecord, ChangeKind)> {
    let index: HashMap<&ItemId, &TrackedItem> = tracked.iter().map(|item| (&item.id, item)).collect();
    let mut changed = Vec::new();

    for record in collected {
        let Some(known) = index.get(&record.id) else {
            continue;
        };
        let current = record.current_status();
        if current.is_empty() || current == known.last_known_status {
            continue;
        }
        debug!(
            id = %record.id,
            old = %known.last_known_status,
            new = %current,
            "status moved"
        );
        if is_important_status_change(&known.last_known_status, current) {
            changed.push((
                record,
                ChangeKind::StatusChange {
                    old: known.last_known_status.clone(),
                    new: current.to_string(),
                },
            ));
        }
    }
    changed
}

/// First match over: changed records meeting `min_importance`, new records
/// meeting it, any changed record, any new record.
pub fn select(
    new: &[&CollectedRecord],
    changed: &[(&CollectedRecord, ChangeKind)],
    min_importance: u8,
) -> Option<Selection> {
    let changed_selection = |(record, change): &(&CollectedRecord, ChangeKind)| Selection {
        record: (*record).clone(),
        change: change.clone(),
    };
    let new_selection = |record: &&CollectedRecord| Selection {
        record: (*record).clone(),
        change: ChangeKind::New,
    };

    changed
        .iter()
        .find(|(record, _)| record.importance >= min_importance)
        .map(changed_selection)
        .or_else(|| {
            new.iter()
                .find(|record| record.importance >= min_importance)
                .map(new_selection)
        })
        .or_else(|| changed.first().map(changed_selection))
        .or_else(|| new.first().map(new_selection))
}

/// Tracked items whose `tracked_at` falls on `date` (UTC)
pub fn posts_on(tracked: &[TrackedItem], date: NaiveDate) -> usize {
    tracked
        .iter()
        .filter(|item| item.tracked_at.date_naive() == date)
        .count()
}

/// Daily budget and importance floor applied just before publishing.
pub fn posting_gate(
    record: &CollectedRecord,
    tracked: &[TrackedItem],
    policy: &ReconcilePolicy,
    now: DateTime<Utc>,
) -> Result<(), Veto> {
    let posted_today = posts_on(tracked, now.date_naive());
    if posted_today >= policy.max_posts_per_day {
        return Err(Veto::DailyLimit {
            posted_today,
            max: policy.max_posts_per_day,
        });
    }
    if record.importance < policy.posting_floor {
        return Err(Veto::BelowFloor {
            importance: record.importance,
            floor: policy.posting_floor,
        });
    }
    Ok(())
}

/// Replace the item with the same id, or append.
pub fn upsert(tracked: &mut Vec<TrackedItem>, item: TrackedItem) {
    match tracked.iter_mut().find(|existing| existing.id == item.id) {
        Some(existing) => *existing = item,
        None => tracked.push(item),
    }
}

pub fn reconcile(
    collected: &[CollectedRecord],
    tracked: &[TrackedItem],
    policy: &ReconcilePolicy,
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut updated_tracked = prune(tracked, policy.retention_days, now);
    let pruned = tracked.len() - updated_tracked.len();

    let new = filter_new(collected, &updated_tracked);
    let changed = detect_status_changes(collected, &updated_tracked);
    info!(new = new.len(), changed = changed.len(), pruned, "reconciled collected records");

    let mut result = Reconciliation {
        selected: None,
        updated_tracked: Vec::new(),
        pruned,
        new_count: new.len(),
        changed_count: changed.len(),
        veto: None,
    };

    if let Some(selection) = select(&new, &changed, policy.min_importance) {
        match posting_gate(&selection.record, &updated_tracked, policy, now) {
            Ok(()) => {
                info!(
                    id = %selection.record.id,
                    number = %selection.record.display_number,
                    importance = selection.record.importance,
                    "selected record"
                );
                upsert(
                    &mut updated_tracked,
                    TrackedItem::from_record(&selection.record, now),
                );
                result.selected = Some(selection);
            }
            Err(veto) => {
                info!(id = %selection.record.id, ?veto, "selection vetoed by posting gate");
                result.veto = Some(veto);
            }
        }
    }

    result.updated_tracked = updated_tracked;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityKind, StatusDetail};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 20, 15, 0, 0).unwrap()
    }

    fn record(id: i64, status: &str, importance: u8) -> CollectedRecord {
        CollectedRecord {
            kind: EntityKind::Bill,
            id: ItemId::Numeric(id),
            display_number: format!("PL {}/2025", id),
            summary: String::new(),
            presented_at: String::new(),
            status: StatusDetail {
                procedure: status.to_string(),
                ..Default::default()
            },
            importance,
            category: "diversos".to_string(),
            source_url: String::new(),
            full_text_url: None,
            authors: Vec::new(),
            tally: None,
            urgency: None,
        }
    }

    fn tracked(id: i64, status: &str, days_ago: i64) -> TrackedItem {
        TrackedItem {
            id: ItemId::Numeric(id),
            display_number: format!("PL {}/2025", id),
            last_known_status: status.to_string(),
            category: "diversos".to_string(),
            importance: 3,
            tracked_at: now() - Duration::days(days_ago),
            posted: true,
        }
    }

    fn policy() -> ReconcilePolicy {
        ReconcilePolicy::from(&TrackerSettings::bills())
    }

    #[test]
    fn test_status_change_beats_new_item() {
        let tracked_items = vec![tracked(123, "Apresentação de Proposição", 1)];
        let collected = vec![
            record(123, "Aprovado em Comissão", 4),
            record(125, "Apresentação de Proposição", 5),
        ];

        let result = reconcile(&collected, &tracked_items, &policy(), now());
        let selection = result.selected.expect("a selection");
        assert_eq!(selection.record.id, ItemId::Numeric(123));
        assert_eq!(
            selection.change,
            ChangeKind::StatusChange {
                old: "Apresentação de Proposição".to_string(),
                new: "Aprovado em Comissão".to_string(),
            }
        );
        assert_eq!(result.new_count, 1);
        assert_eq!(result.changed_count, 1);

        // upserted in place with the new status
        assert_eq!(result.updated_tracked.len(), 1);
        assert_eq!(result.updated_tracked[0].last_known_status, "Aprovado em Comissão");
        assert_eq!(result.updated_tracked[0].tracked_at, now());
        assert_eq!(result.updated_tracked[0].importance, 4);
    }

    #[test]
    fn test_important_status_examples() {
        assert!(is_important_status_change("Aguardando Análise", "Aprovado em Comissão"));
        assert!(!is_important_status_change("Aguardando Análise", "Remetido a Outro Órgão"));
        assert!(is_important_status_change("", "Pronta para Pauta no PLENÁRIO"));
    }

    #[test]
    fn test_unimportant_change_is_discarded() {
        let tracked_items = vec![tracked(1, "Aguardando Análise", 1)];
        let collected = vec![record(1, "Remetido a Outro Órgão", 5)];
        let changed = detect_status_changes(&collected, &tracked_items);
        assert!(changed.is_empty());
        // tracked, so not new either
        assert!(filter_new(&collected, &tracked_items).is_empty());
        assert!(reconcile(&collected, &tracked_items, &policy(), now()).selected.is_none());
    }

    #[test]
    fn test_tracked_id_is_never_new() {
        let tracked_items = vec![tracked(7, "x", 2)];
        let mut other = record(7, "completely different", 1);
        other.display_number = "MPV 1/2020".to_string();
        other.category = "saúde".to_string();
        assert!(filter_new(&[other], &tracked_items).is_empty());
    }

    #[test]
    fn test_empty_status_is_not_a_change() {
        let tracked_items = vec![tracked(1, "Aguardando Análise", 1)];
        let collected = vec![record(1, "", 5)];
        assert!(detect_status_changes(&collected, &tracked_items).is_empty());
    }

    #[test]
    fn test_prune_is_idempotent() {
        let items = vec![
            tracked(1, "a", 0),
            tracked(2, "b", 29),
            tracked(3, "c", 31),
            tracked(4, "d", 90),
        ];
        let once = prune(&items, 30, now());
        let twice = prune(&once, 30, now());
        assert_eq!(once, twice);
        let ids: Vec<_> = once.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec![ItemId::Numeric(1), ItemId::Numeric(2)]);
    }

    #[test]
    fn test_daily_limit_vetoes_selection() {
        let tracked_items = vec![tracked(1, "a", 0), tracked(2, "b", 0), tracked(3, "c", 0)];
        let collected = vec![record(10, "Apresentação de Proposição", 5)];

        let result = reconcile(&collected, &tracked_items, &policy(), now());
        assert!(result.selected.is_none());
        assert_eq!(
            result.veto,
            Some(Veto::DailyLimit { posted_today: 3, max: 3 })
        );
        assert_eq!(result.updated_tracked, tracked_items);
    }

    #[test]
    fn test_posting_floor_applies_after_selection() {
        // selected through the fallback branch, then refused by the floor
        let collected = vec![record(10, "Apresentação de Proposição", 1)];
        let result = reconcile(&collected, &[], &policy(), now());
        assert!(result.selected.is_none());
        assert_eq!(result.veto, Some(Veto::BelowFloor { importance: 1, floor: 2 }));
        assert!(result.updated_tracked.is_empty());
    }

    #[test]
    fn test_selection_fallbacks_follow_input_order() {
        let a = record(1, "", 2);
        let b = record(2, "", 2);
        let new = vec![&a, &b];
        let selection = select(&new, &[], 3).unwrap();
        assert_eq!(selection.record.id, ItemId::Numeric(1));
        assert_eq!(selection.change, ChangeKind::New);

        // first eligible, not highest importance
        let c = record(3, "", 3);
        let d = record(4, "", 5);
        let new = vec![&a, &c, &d];
        assert_eq!(select(&new, &[], 3).unwrap().record.id, ItemId::Numeric(3));
    }

    #[test]
    fn test_low_importance_change_still_beats_new_fallback() {
        let changed_record = record(1, "Arquivado", 2);
        let new_record = record(2, "", 2);
        let changed = vec![(
            &changed_record,
            ChangeKind::StatusChange { old: "x".to_string(), new: "Arquivado".to_string() },
        )];
        let selection = select(&[&new_record], &changed, 3).unwrap();
        assert_eq!(selection.record.id, ItemId::Numeric(1));
    }

    #[test]
    fn test_empty_inputs_yield_nothing() {
        let result = reconcile(&[], &[], &policy(), now());
        assert!(result.selected.is_none());
        assert!(result.veto.is_none());
        assert!(result.updated_tracked.is_empty());
    }

    #[test]
    fn test_new_selection_is_appended() {
        let tracked_items = vec![tracked(1, "a", 3)];
        let collected = vec![record(9, "Apresentação de Proposição", 4)];
        let result = reconcile(&collected, &tracked_items, &policy(), now());
        assert_eq!(result.selected.unwrap().change, ChangeKind::New);
        assert_eq!(result.updated_tracked.len(), 2);
        assert_eq!(result.updated_tracked[1].id, ItemId::Numeric(9));
        assert!(result.updated_tracked[1].posted);
    }
}

use std::collections::BTreeMap;

use contracts::{EntityId, EntityRef};

#[derive(Debug, Clone)]
struct PendingNote {
    entity_label: String,
    labels: Vec<String>,
}

/// Collects per-entity notices and flushes them as one line per
/// `(entity, reason)` pair. Purely observational.
#[derive(Debug, Clone, Default)]
pub struct LogBatcher {
    pending: BTreeMap<(EntityId, String), PendingNote>,
}

impl LogBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entity: &EntityRef, reason: &str, label: &str) {
        let note = self
            .pending
            .entry((entity.id, reason.to_string()))
            .or_insert_with(|| PendingNote {
                entity_label: entity.label.clone(),
                labels: Vec::new(),
            });
        note.labels.push(label.to_string());
    }

    /// Emits and clears all pending notes, ordered by entity id then reason.
    pub fn flush(&mut self) -> Vec<String> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|((_, reason), note)| {
                let line = format!(
                    "{}: blacklisted {} (reason: {})",
                    note.entity_label,
                    note.labels.join(", "),
                    reason
                );
                tracing::debug!(target: "blacklist", "{line}");
                line
            })
            .collect()
    }

    pub fn drop_entity(&mut self, entity_id: EntityId) {
        self.pending.retain(|(id, _), _| *id != entity_id);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_consolidates_by_entity_and_reason() {
        let mut batcher = LogBatcher::new();
        let pawn = EntityRef::new(1, "Pawn1");
        batcher.record(&pawn, "unreachable", "AK47");
        batcher.record(&pawn, "unreachable", "M16");
        batcher.record(&pawn, "forbidden", "Knife");
        batcher.record(&EntityRef::new(2, "Pawn2"), "unreachable", "AK47");

        let lines = batcher.flush();
        assert_eq!(
            lines,
            vec![
                "Pawn1: blacklisted Knife (reason: forbidden)".to_string(),
                "Pawn1: blacklisted AK47, M16 (reason: unreachable)".to_string(),
                "Pawn2: blacklisted AK47 (reason: unreachable)".to_string(),
            ]
        );
        assert_eq!(batcher.pending_len(), 0);
        assert!(batcher.flush().is_empty());
    }

    #[test]
    fn drop_entity_discards_only_that_entity() {
        let mut batcher = LogBatcher::new();
        batcher.record(&EntityRef::new(1, "Pawn1"), "r", "AK47");
        batcher.record(&EntityRef::new(1, "Pawn1"), "s", "AK47");
        batcher.record(&EntityRef::new(2, "Pawn2"), "r", "AK47");

        batcher.drop_entity(EntityId(1));
        assert_eq!(batcher.pending_len(), 1);
        assert_eq!(batcher.flush(), vec!["Pawn2: blacklisted AK47 (reason: r)"]);
    }
}

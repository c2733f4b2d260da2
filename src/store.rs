use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::{CardLabError, CardLabResult},
    model::{Card, Color, Slot},
    persist::StatePersistence,
};

/// Record name under which the result grid persists.
pub const RESULTS_RECORD: &str = "results";

type Grid = BTreeMap<Color, BTreeMap<u8, Card>>;

/// Durable mapping from (color, number) to the card's last-known render
/// artifacts. Loaded on start; every `put` persists. An absent entry means
/// the slot has never been rendered.
pub struct ResultStore {
    grid: Grid,
    persist: Arc<dyn StatePersistence>,
}

impl ResultStore {
    pub fn load(persist: Arc<dyn StatePersistence>) -> CardLabResult<Self> {
        let grid: Grid = match persist.load(RESULTS_RECORD)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CardLabError::serde(format!("parse persisted results: {e}")))?,
            None => Grid::new(),
        };

        for (&color, row) in &grid {
            for (&number, card) in row {
                if card.background_color != color || card.number != number {
                    return Err(CardLabError::validation(format!(
                        "persisted card at {} carries identity {}",
                        Slot::new(color, number),
                        card.slot(),
                    )));
                }
            }
        }

        Ok(Self { grid, persist })
    }

    pub fn get(&self, color: Color, number: u8) -> Option<&Card> {
        self.grid.get(&color).and_then(|row| row.get(&number))
    }

    /// Upsert exactly one slot. The card's own identity must match the
    /// indexing pair; siblings are never touched.
    pub fn put(&mut self, color: Color, number: u8, card: Card) -> CardLabResult<()> {
        if card.background_color != color || card.number != number {
            return Err(CardLabError::validation(format!(
                "card identity {} does not match slot {}",
                card.slot(),
                Slot::new(color, number),
            )));
        }

        self.grid.entry(color).or_default().insert(number, card);
        self.persist_grid()
    }

    /// A slot is complete once its stored card carries a result layer.
    pub fn is_complete(&self, slot: Slot) -> bool {
        self.get(slot.color, slot.number)
            .is_some_and(|card| card.result_layer.is_some())
    }

    /// Number of complete slots across the whole grid.
    pub fn completed_count(&self) -> usize {
        self.grid
            .values()
            .flat_map(|row| row.values())
            .filter(|card| card.result_layer.is_some())
            .count()
    }

    fn persist_grid(&self) -> CardLabResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.grid)
            .map_err(|e| CardLabError::serde(format!("encode results: {e}")))?;
        self.persist.save(RESULTS_RECORD, &bytes)
    }
}

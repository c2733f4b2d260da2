use std::fmt;

use crate::error::{CardLabError, CardLabResult};

/// One suit of the deck. The palette is a closed set so slot keys are
/// checked at compile time instead of being open string indices.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    pub const ALL: [Color; 3] = [Color::Red, Color::Green, Color::Blue];

    /// CSS color value of the suit, used as the card background fill.
    pub fn rgba8(self) -> [u8; 4] {
        match self {
            Color::Red => [255, 0, 0, 255],
            Color::Green => [0, 128, 0, 255],
            Color::Blue => [0, 0, 255, 255],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Color {
    type Err = CardLabError;

    fn from_str(s: &str) -> CardLabResult<Self> {
        match s {
            "red" => Ok(Color::Red),
            "green" => Ok(Color::Green),
            "blue" => Ok(Color::Blue),
            other => Err(CardLabError::validation(format!(
                "unknown color '{other}' (expected red, green or blue)"
            ))),
        }
    }
}

/// The (color, number) coordinate uniquely identifying one card design.
/// `Ord` gives batches a stable submission order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Slot {
    pub color: Color,
    pub number: u8,
}

impl Slot {
    pub fn new(color: Color, number: u8) -> Self {
        Self { color, number }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.color, self.number)
    }
}

/// Smallest and largest card number carried by a deck.
pub const NUMBER_MIN: u8 = 1;
pub const NUMBER_MAX: u8 = 10;

/// Center glyph for a card number. Numbers outside the table render no
/// center glyph; corner numerals are always the decimal representation.
pub fn center_glyph(number: u8) -> Option<&'static str> {
    match number {
        1 => Some("一"),
        2 => Some("二"),
        3 => Some("三"),
        4 => Some("四"),
        5 => Some("五"),
        6 => Some("六"),
        7 => Some("七"),
        8 => Some("八"),
        9 => Some("九"),
        10 => Some("十"),
        _ => None,
    }
}

/// Lifecycle of a card within one render/request cycle, derived from which
/// layers exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardPhase {
    Unrendered,
    SourceReady,
    MaskReady,
    Complete,
}

/// The working unit the renderer and orchestrators operate on. Identity
/// (`number`, `background_color`) never changes once created; the three
/// layers are filled in as the pipeline advances. Layers are PNG data URIs.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Card {
    pub number: u8,
    pub background_color: Color,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_layer: Option<String>,
}

impl Card {
    pub fn new(color: Color, number: u8) -> Self {
        Self {
            number,
            background_color: color,
            raw_layer: None,
            mask_layer: None,
            result_layer: None,
        }
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.background_color, self.number)
    }

    pub fn phase(&self) -> CardPhase {
        if self.result_layer.is_some() {
            CardPhase::Complete
        } else if self.mask_layer.is_some() {
            CardPhase::MaskReady
        } else if self.raw_layer.is_some() {
            CardPhase::SourceReady
        } else {
            CardPhase::Unrendered
        }
    }

    /// Both inputs the inpainting request needs are present.
    pub fn request_ready(&self) -> bool {
        self.raw_layer.is_some() && self.mask_layer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_roundtrips_through_serde_lowercase() {
        let s = serde_json::to_string(&Color::Green).unwrap();
        assert_eq!(s, "\"green\"");
        let c: Color = serde_json::from_str(&s).unwrap();
        assert_eq!(c, Color::Green);
    }

    #[test]
    fn slot_ordering_is_stable() {
        let mut slots = vec![
            Slot::new(Color::Blue, 2),
            Slot::new(Color::Red, 10),
            Slot::new(Color::Red, 1),
        ];
        slots.sort();
        assert_eq!(
            slots,
            vec![
                Slot::new(Color::Red, 1),
                Slot::new(Color::Red, 10),
                Slot::new(Color::Blue, 2),
            ]
        );
    }

    #[test]
    fn glyph_table_covers_supported_range_only() {
        for n in NUMBER_MIN..=NUMBER_MAX {
            assert!(center_glyph(n).is_some(), "missing glyph for {n}");
        }
        assert!(center_glyph(0).is_none());
        assert!(center_glyph(11).is_none());
    }

    #[test]
    fn phase_follows_layer_presence() {
        let mut card = Card::new(Color::Red, 4);
        assert_eq!(card.phase(), CardPhase::Unrendered);
        card.raw_layer = Some("raw".into());
        assert_eq!(card.phase(), CardPhase::SourceReady);
        card.mask_layer = Some("mask".into());
        assert_eq!(card.phase(), CardPhase::MaskReady);
        assert!(card.request_ready());
        card.result_layer = Some("result".into());
        assert_eq!(card.phase(), CardPhase::Complete);
    }
}

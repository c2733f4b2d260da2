use std::{fmt, ops::RangeInclusive, path::PathBuf};

use crate::{
    error::{CardLabError, CardLabResult},
    model::{Color, NUMBER_MAX, NUMBER_MIN, Slot},
    persist::StatePersistence,
};

/// Record name under which the configuration persists.
pub const CONFIG_RECORD: &str = "config";

/// Scale/rotation/offset parameters applied to one drawn element.
///
/// `rotation` is in radians. `offset_x`/`offset_y` scale the element's base
/// anchor position rather than adding to it, so `1.0` means "at the default
/// anchor".
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transform {
    pub scale: f64,
    pub rotation: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            offset_x: 1.0,
            offset_y: 1.0,
        }
    }
}

impl Transform {
    pub fn validate(&self) -> CardLabResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(CardLabError::validation(
                "transform scale must be finite and > 0",
            ));
        }
        for (name, v) in [
            ("rotation", self.rotation),
            ("offset_x", self.offset_x),
            ("offset_y", self.offset_y),
        ] {
            if !v.is_finite() {
                return Err(CardLabError::validation(format!(
                    "transform {name} must be finite"
                )));
            }
        }
        Ok(())
    }
}

/// Visual style snapshot a render runs against. Immutable during a render.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CardStyle {
    /// Optional TTF/OTF file the center glyph and numerals are shaped with.
    /// When absent, `font_family` is resolved against the system collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_source: Option<PathBuf>,
    pub font_family: String,
    pub text_color: [u8; 4],
    pub center_glyph: Transform,
    pub corner_numeral: Transform,
}

impl Default for CardStyle {
    fn default() -> Self {
        Self {
            font_source: None,
            font_family: "sans-serif".to_string(),
            text_color: [255, 255, 255, 255],
            center_glyph: Transform::default(),
            corner_numeral: Transform::default(),
        }
    }
}

impl CardStyle {
    pub fn validate(&self) -> CardLabResult<()> {
        if self.font_family.trim().is_empty() {
            return Err(CardLabError::validation("font_family must be non-empty"));
        }
        self.center_glyph.validate()?;
        self.corner_numeral.validate()
    }
}

/// Inpainting model the service is asked to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Model {
    FluxDevInpainting,
    StableDiffusionInpainting,
}

impl Model {
    pub fn id(self) -> &'static str {
        match self {
            Model::FluxDevInpainting => "flux-dev-inpainting",
            Model::StableDiffusionInpainting => "stable-diffusion-inpainting",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Tuning parameters forwarded verbatim to the inpainting service.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InpaintTuning {
    pub strength: f32,
    pub num_outputs: u32,
    pub output_format: String,
    pub guidance_scale: f32,
    pub output_quality: u32,
    pub num_inference_steps: u32,
}

impl Default for InpaintTuning {
    fn default() -> Self {
        Self {
            strength: 1.0,
            num_outputs: 1,
            output_format: "png".to_string(),
            guidance_scale: 7.0,
            output_quality: 90,
            num_inference_steps: 30,
        }
    }
}

/// Which mask tone the model treats as repaintable. The drawing code asserts
/// one convention; the model contract decides which is correct, so this is a
/// configuration constant rather than hard-coded polarity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolarity {
    /// White background repaints; black ink marks the kept glyph/dot shapes.
    #[default]
    WhiteRepaints,
    /// Inverted convention.
    BlackRepaints,
}

impl MaskPolarity {
    /// (background, ink) tones for the mask layer.
    pub fn tones(self) -> ([u8; 4], [u8; 4]) {
        const WHITE: [u8; 4] = [255, 255, 255, 255];
        const BLACK: [u8; 4] = [0, 0, 0, 255];
        match self {
            MaskPolarity::WhiteRepaints => (WHITE, BLACK),
            MaskPolarity::BlackRepaints => (BLACK, WHITE),
        }
    }
}

/// Process-wide configuration: loaded on start, persisted on every mutation
/// by the owner, read-only from the pipeline's perspective.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub palette: Vec<Color>,
    pub numbers_per_color: u8,
    pub style: CardStyle,
    pub prompt: String,
    pub render_width: u32,
    pub model: Model,
    pub tuning: InpaintTuning,
    pub mask_polarity: MaskPolarity,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            palette: Color::ALL.to_vec(),
            numbers_per_color: NUMBER_MAX,
            style: CardStyle::default(),
            prompt: "A steampunk inspired card design featuring intricate gears and cogs, \
                     with a color palette of brass, copper, and iron."
                .to_string(),
            render_width: 512,
            model: Model::StableDiffusionInpainting,
            tuning: InpaintTuning::default(),
            mask_polarity: MaskPolarity::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> CardLabResult<()> {
        if self.palette.is_empty() {
            return Err(CardLabError::validation("palette must be non-empty"));
        }
        for (i, color) in self.palette.iter().enumerate() {
            if self.palette[..i].contains(color) {
                return Err(CardLabError::validation(format!(
                    "palette repeats color '{color}'"
                )));
            }
        }
        if !(NUMBER_MIN..=NUMBER_MAX).contains(&self.numbers_per_color) {
            return Err(CardLabError::validation(format!(
                "numbers_per_color must be within {NUMBER_MIN}..={NUMBER_MAX}"
            )));
        }
        if self.render_width == 0 {
            return Err(CardLabError::validation("render_width must be > 0"));
        }
        // The surface is u16-indexed and 1.5x taller than wide.
        if crate::surface::card_height(self.render_width) > u32::from(u16::MAX) {
            return Err(CardLabError::validation(
                "render_width too large for the drawing surface",
            ));
        }
        if self.prompt.trim().is_empty() {
            return Err(CardLabError::validation("prompt must be non-empty"));
        }
        self.style.validate()
    }

    /// Number range of every suit, low to high.
    pub fn numbers(&self) -> RangeInclusive<u8> {
        NUMBER_MIN..=self.numbers_per_color
    }

    /// Every slot of the configured grid in stable (color, number) order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.palette
            .iter()
            .flat_map(|&color| self.numbers().map(move |number| Slot::new(color, number)))
    }

    /// Load the persisted configuration, falling back to defaults when the
    /// record has never been written.
    pub fn load_or_default(persist: &dyn StatePersistence) -> CardLabResult<Self> {
        let config = match persist.load(CONFIG_RECORD)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CardLabError::serde(format!("parse persisted config: {e}")))?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, persist: &dyn StatePersistence) -> CardLabResult<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| CardLabError::serde(format!("encode config: {e}")))?;
        persist.save(CONFIG_RECORD, &bytes)
    }
}

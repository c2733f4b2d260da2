use std::{
    borrow::Cow,
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    config::CardStyle,
    error::{CardLabError, CardLabResult},
};

/// RGBA8 brush color carried through Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<[u8; 4]> for TextBrush {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        Self { r, g, b, a }
    }
}

/// Shapes card text through a reusable pair of Parley contexts. Explicit
/// font files are registered once and addressed by their detected family
/// name; otherwise the style's family stack resolves against the system
/// collection.
pub struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    registered: HashMap<PathBuf, String>,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            registered: HashMap::new(),
        }
    }

    /// Shape and lay out a single run of text.
    pub fn shape(
        &mut self,
        text: &str,
        style: &CardStyle,
        size_px: f32,
        bold: bool,
        brush: TextBrush,
    ) -> CardLabResult<parley::Layout<TextBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(CardLabError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let family = match &style.font_source {
            Some(path) => self.register_font_file(path)?,
            None => style.font_family.clone(),
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(family)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        if bold {
            builder.push_default(parley::style::StyleProperty::FontWeight(
                parley::style::FontWeight::BOLD,
            ));
        }
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    /// Advance width of `text` at `size_px`, the equivalent of a canvas
    /// `measureText` call.
    pub fn measure_width(
        &mut self,
        text: &str,
        style: &CardStyle,
        size_px: f32,
        bold: bool,
    ) -> CardLabResult<f64> {
        let layout = self.shape(text, style, size_px, bold, TextBrush::default())?;
        Ok(f64::from(layout.width()))
    }

    fn register_font_file(&mut self, path: &Path) -> CardLabResult<String> {
        if let Some(family) = self.registered.get(path) {
            return Ok(family.clone());
        }

        let bytes = std::fs::read(path)
            .with_context(|| format!("read font file '{}'", path.display()))?;
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            CardLabError::validation(format!(
                "no font families registered from '{}'",
                path.display()
            ))
        })?;
        let family = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| CardLabError::validation("registered font family has no name"))?
            .to_string();

        self.registered.insert(path.to_path_buf(), family.clone());
        Ok(family)
    }
}

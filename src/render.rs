use std::{collections::HashMap, sync::Arc};

use crate::{
    blur,
    codec::{self, DecodedImage},
    config::{CardStyle, MaskPolarity, Transform},
    error::{CardLabError, CardLabResult},
    model::{Card, center_glyph},
    surface::CardSurface,
    text::{TextBrush, TextEngine},
};

/// The three renderable variants of a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    /// Undecorated background, handed to the model as the base image.
    Source,
    /// Repaint-region mask: glyph and corner dots in ink on a flat field,
    /// feathered so the model never sees a hard edge.
    Mask,
    /// Background, composited result artwork, numerals and glyph.
    Full,
}

impl std::str::FromStr for LayerKind {
    type Err = CardLabError;

    fn from_str(s: &str) -> CardLabResult<Self> {
        match s {
            "source" => Ok(LayerKind::Source),
            "mask" => Ok(LayerKind::Mask),
            "full" => Ok(LayerKind::Full),
            other => Err(CardLabError::validation(format!(
                "unknown layer '{other}' (expected source, mask or full)"
            ))),
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LayerKind::Source => "source",
            LayerKind::Mask => "mask",
            LayerKind::Full => "full",
        })
    }
}

// Proportions of the render width, matching the deck's fixed card design.
const CORNER_DISTANCE_FACTOR: f64 = 0.1;
const CORNER_FONT_FACTOR: f64 = 0.15;
const CENTER_FONT_FACTOR: f64 = 0.9;
const DOT_RADIUS_FACTOR: f64 = 0.1;

/// The mask glyph is drawn slightly larger than the full layer's so the
/// repaint region fully covers the visible glyph.
const MASK_GLYPH_OVERSCAN: f64 = 1.01;

const MASK_FEATHER_RADIUS: u32 = 1;
const MASK_FEATHER_SIGMA: f32 = 0.5;

/// Anchor of the top-left corner element: the corner distance scaled by the
/// transform's offsets.
pub fn corner_anchor(width: f64, t: &Transform) -> kurbo::Point {
    let d = CORNER_DISTANCE_FACTOR * width;
    kurbo::Point::new(d * t.offset_x, d * t.offset_y)
}

/// Anchor of the center glyph: the surface midpoint scaled by the
/// transform's offsets.
pub fn center_anchor(width: f64, height: f64, t: &Transform) -> kurbo::Point {
    kurbo::Point::new(width / 2.0 * t.offset_x, height / 2.0 * t.offset_y)
}

/// Local placement of one drawn element: translate to the anchor, then
/// rotate. Scale applies to font size or shape radius, not the affine.
pub fn element_affine(anchor: kurbo::Point, rotation: f64) -> kurbo::Affine {
    kurbo::Affine::translate(anchor.to_vec2()) * kurbo::Affine::rotate(rotation)
}

/// Maps the top-left corner instance onto the bottom-right one so the card
/// reads correctly upside-down.
pub fn mirror_affine(width: f64, height: f64) -> kurbo::Affine {
    kurbo::Affine::translate((width, height)) * kurbo::Affine::rotate(std::f64::consts::PI)
}

/// Renders the three layer variants of a card onto a [`CardSurface`].
///
/// The mask polarity is fixed per renderer; everything else comes from the
/// card identity and the style snapshot passed to each call.
pub struct CardRenderer {
    text: TextEngine,
    mask_polarity: MaskPolarity,
    // Drawable fonts keyed by the source blob id of the shaped run.
    font_cache: HashMap<u64, vello_cpu::peniko::FontData>,
}

impl Default for CardRenderer {
    fn default() -> Self {
        Self::new(MaskPolarity::default())
    }
}

impl CardRenderer {
    pub fn new(mask_polarity: MaskPolarity) -> Self {
        Self {
            text: TextEngine::new(),
            mask_polarity,
            font_cache: HashMap::new(),
        }
    }

    /// Render one layer of `card` and return it as a PNG data URI.
    pub fn render(
        &mut self,
        layer: LayerKind,
        card: &Card,
        style: &CardStyle,
        surface: &mut CardSurface,
    ) -> CardLabResult<String> {
        let (w, h) = (f64::from(surface.width()), f64::from(surface.height()));

        let bytes = match layer {
            LayerKind::Source => {
                fill_background(surface.ctx(), w, h, card.background_color.rgba8());
                surface.capture()
            }
            LayerKind::Mask => {
                let (bg, ink) = self.mask_polarity.tones();
                fill_background(surface.ctx(), w, h, bg);
                self.draw_corner_dots(surface, card, style, ink)?;
                self.draw_center_glyph(surface, card, style, ink, MASK_GLYPH_OVERSCAN)?;
                let raster = surface.capture();
                blur::feather_rgba8(
                    &raster,
                    surface.width(),
                    surface.height(),
                    MASK_FEATHER_RADIUS,
                    MASK_FEATHER_SIGMA,
                )?
            }
            LayerKind::Full => {
                fill_background(surface.ctx(), w, h, card.background_color.rgba8());
                if let Some(result) = &card.result_layer {
                    let decoded = codec::decode_data_uri(result)?;
                    draw_image_scaled(surface.ctx(), &decoded, w, h)?;
                }
                self.draw_corner_dots(surface, card, style, card.background_color.rgba8())?;
                self.draw_corner_numerals(surface, card, style)?;
                self.draw_center_glyph(surface, card, style, style.text_color, 1.0)?;
                surface.capture()
            }
        };

        codec::encode_png_data_uri(&bytes, surface.width(), surface.height())
    }

    /// Decimal numeral in the top-left corner and mirrored into the
    /// bottom-right, both from the same transform parameters.
    fn draw_corner_numerals(
        &mut self,
        surface: &mut CardSurface,
        card: &Card,
        style: &CardStyle,
    ) -> CardLabResult<()> {
        let (w, h) = (f64::from(surface.width()), f64::from(surface.height()));
        let t = style.corner_numeral;
        let size = (CORNER_FONT_FACTOR * w * t.scale) as f32;
        let layout = self.text.shape(
            &card.number.to_string(),
            style,
            size,
            true,
            TextBrush::from(style.text_color),
        )?;

        let local = element_affine(corner_anchor(w, &t), t.rotation);
        self.draw_layout(surface.ctx(), &layout, local);
        self.draw_layout(surface.ctx(), &layout, mirror_affine(w, h) * local);
        Ok(())
    }

    /// Round shapes behind each corner numeral, mirrored like the numerals.
    fn draw_corner_dots(
        &mut self,
        surface: &mut CardSurface,
        card: &Card,
        style: &CardStyle,
        tone: [u8; 4],
    ) -> CardLabResult<()> {
        let (w, h) = (f64::from(surface.width()), f64::from(surface.height()));
        let t = style.corner_numeral;
        let size = (CORNER_FONT_FACTOR * w * t.scale) as f32;
        let numeral_width = self
            .text
            .measure_width(&card.number.to_string(), style, size, true)?;
        let digit_width = self.text.measure_width("0", style, size, true)?;

        let center = kurbo::Point::new(0.5 * numeral_width, 0.7 * digit_width);
        let radius = DOT_RADIUS_FACTOR * w * t.scale;
        let dot = circle_path(center, radius);

        let ctx = surface.ctx();
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            tone[0], tone[1], tone[2], tone[3],
        ));
        let local = element_affine(corner_anchor(w, &t), t.rotation);
        ctx.set_transform(affine_to_cpu(local));
        ctx.fill_path(&dot);
        ctx.set_transform(affine_to_cpu(mirror_affine(w, h) * local));
        ctx.fill_path(&dot);
        Ok(())
    }

    fn draw_center_glyph(
        &mut self,
        surface: &mut CardSurface,
        card: &Card,
        style: &CardStyle,
        tone: [u8; 4],
        overscan: f64,
    ) -> CardLabResult<()> {
        let Some(glyph) = center_glyph(card.number) else {
            return Ok(());
        };

        let (w, h) = (f64::from(surface.width()), f64::from(surface.height()));
        let t = style.center_glyph;
        let size = (CENTER_FONT_FACTOR * w * t.scale * overscan) as f32;
        let layout = self
            .text
            .shape(glyph, style, size, false, TextBrush::from(tone))?;

        // Center the layout box on the anchor after rotating about it.
        let centering = kurbo::Affine::translate((
            -f64::from(layout.width()) / 2.0,
            -f64::from(layout.height()) / 2.0,
        ));
        let affine = element_affine(center_anchor(w, h, &t), t.rotation) * centering;
        self.draw_layout(surface.ctx(), &layout, affine);
        Ok(())
    }

    fn draw_layout(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &parley::Layout<TextBrush>,
        affine: kurbo::Affine,
    ) {
        ctx.set_transform(affine_to_cpu(affine));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));

                let font = run.run().font();
                let font_data = self.font_cache.entry(font.data.id()).or_insert_with(|| {
                    vello_cpu::peniko::FontData::new(
                        vello_cpu::peniko::Blob::from(font.data.as_ref().to_vec()),
                        font.index,
                    )
                });

                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(font_data)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
}

fn fill_background(ctx: &mut vello_cpu::RenderContext, w: f64, h: f64, rgba: [u8; 4]) {
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
        rgba[0], rgba[1], rgba[2], rgba[3],
    ));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
}

/// Draw a decoded result layer stretched over the whole surface.
fn draw_image_scaled(
    ctx: &mut vello_cpu::RenderContext,
    decoded: &DecodedImage,
    w: f64,
    h: f64,
) -> CardLabResult<()> {
    let pixmap = premul_bytes_to_pixmap(&decoded.rgba8_premul, decoded.width, decoded.height)?;
    let paint = vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    };

    let sx = w / f64::from(decoded.width);
    let sy = h / f64::from(decoded.height);
    ctx.set_transform(vello_cpu::kurbo::Affine::scale_non_uniform(sx, sy));
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(decoded.width),
        f64::from(decoded.height),
    ));
    Ok(())
}

fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> CardLabResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| CardLabError::validation("result image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| CardLabError::validation("result image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(CardLabError::validation(
            "result image byte length mismatch",
        ));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        may_have_opacities |= px[3] != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        });
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

fn circle_path(center: kurbo::Point, radius: f64) -> vello_cpu::kurbo::BezPath {
    use kurbo::Shape as _;
    let path = kurbo::Circle::new(center, radius).to_path(0.1);
    bezpath_to_cpu(&path)
}

fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let point = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point(p)),
            PathEl::LineTo(p) => out.line_to(point(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point(p1), point(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(point(p1), point(p2), point(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::Color, surface::CardSurface};

    fn px(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    }

    #[test]
    fn mirrored_corner_matches_reflected_anchor() {
        let (w, h) = (512.0, 768.0);
        let t = Transform {
            scale: 1.3,
            rotation: 0.4,
            offset_x: 1.2,
            offset_y: 0.8,
        };
        let anchor = corner_anchor(w, &t);
        let local = element_affine(anchor, t.rotation);
        let mirrored = mirror_affine(w, h) * local;

        // The local origin of the mirrored instance lands at the point
        // reflection of the top-left anchor through the card center.
        let p = mirrored * kurbo::Point::ORIGIN;
        assert!((p.x - (w - anchor.x)).abs() < 1e-9);
        assert!((p.y - (h - anchor.y)).abs() < 1e-9);

        // Both instances see the identical local geometry: a unit offset in
        // local space maps to opposite displacements of equal length.
        let q_top = local * kurbo::Point::new(1.0, 0.0);
        let q_bottom = mirrored * kurbo::Point::new(1.0, 0.0);
        let d_top = q_top - (local * kurbo::Point::ORIGIN);
        let d_bottom = q_bottom - (mirrored * kurbo::Point::ORIGIN);
        assert!((d_top.x + d_bottom.x).abs() < 1e-9);
        assert!((d_top.y + d_bottom.y).abs() < 1e-9);
    }

    #[test]
    fn element_affine_translates_then_rotates() {
        let affine = element_affine(kurbo::Point::new(10.0, 20.0), std::f64::consts::FRAC_PI_2);
        let p = affine * kurbo::Point::new(1.0, 0.0);
        assert!((p.x - 10.0).abs() < 1e-9);
        assert!((p.y - 21.0).abs() < 1e-9);
    }

    #[test]
    fn source_layer_is_solid_background() {
        let card = Card::new(Color::Red, 3);
        let style = CardStyle::default();
        let mut renderer = CardRenderer::default();
        let mut surface = CardSurface::acquire(16).unwrap();

        let uri = renderer
            .render(LayerKind::Source, &card, &style, &mut surface)
            .unwrap();
        let decoded = codec::decode_data_uri(&uri).unwrap();
        assert_eq!((decoded.width, decoded.height), (16, 24));
        for y in 0..decoded.height {
            for x in 0..decoded.width {
                assert_eq!(px(&decoded.rgba8_premul, 16, x, y), [255, 0, 0, 255]);
            }
        }
    }

    #[test]
    fn mask_layer_border_is_white() {
        let card = Card::new(Color::Blue, 7);
        let style = CardStyle::default();
        let mut renderer = CardRenderer::default();
        let mut surface = CardSurface::acquire(32).unwrap();

        let uri = renderer
            .render(LayerKind::Mask, &card, &style, &mut surface)
            .unwrap();
        let decoded = codec::decode_data_uri(&uri).unwrap();
        // Ink shapes sit well inside the card; the extreme corners of the
        // feathered mask stay at the background tone.
        assert_eq!(px(&decoded.rgba8_premul, 32, 0, 0), [255, 255, 255, 255]);
        assert_eq!(px(&decoded.rgba8_premul, 32, 31, 47), [255, 255, 255, 255]);
    }

    #[test]
    fn full_layer_without_result_keeps_background() {
        let card = Card::new(Color::Green, 2);
        let style = CardStyle::default();
        let mut renderer = CardRenderer::default();
        let mut surface = CardSurface::acquire(32).unwrap();

        // A missing result layer is not an error.
        let uri = renderer
            .render(LayerKind::Full, &card, &style, &mut surface)
            .unwrap();
        let decoded = codec::decode_data_uri(&uri).unwrap();
        assert_eq!(px(&decoded.rgba8_premul, 32, 0, 0), [0, 128, 0, 255]);
    }

    #[test]
    fn full_layer_composites_result_image() {
        let mut card = Card::new(Color::Green, 2);
        // A 1x1 solid magenta "artwork" stretched over the surface.
        card.result_layer = Some(codec::encode_png_data_uri(&[255, 0, 255, 255], 1, 1).unwrap());

        let style = CardStyle::default();
        let mut renderer = CardRenderer::default();
        let mut surface = CardSurface::acquire(16).unwrap();
        let uri = renderer
            .render(LayerKind::Full, &card, &style, &mut surface)
            .unwrap();
        let decoded = codec::decode_data_uri(&uri).unwrap();
        assert_eq!(px(&decoded.rgba8_premul, 16, 0, 0), [255, 0, 255, 255]);
    }

    #[test]
    fn layer_kind_parses_and_displays() {
        assert_eq!("mask".parse::<LayerKind>().unwrap(), LayerKind::Mask);
        assert_eq!(LayerKind::Full.to_string(), "full");
        assert!("resultish".parse::<LayerKind>().is_err());
    }
}

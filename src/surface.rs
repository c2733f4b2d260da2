use crate::error::{CardLabError, CardLabResult};

/// Cards are half again as tall as they are wide.
pub const ASPECT_RATIO: f64 = 1.5;

/// Surface height for a given render width.
pub fn card_height(width: u32) -> u32 {
    (f64::from(width) * ASPECT_RATIO).round() as u32
}

/// A CPU raster surface for one card render: a `vello_cpu` render context
/// plus the pixmap its output lands in.
pub struct CardSurface {
    width: u16,
    height: u16,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
}

impl CardSurface {
    /// Acquire a surface sized for `render_width`. Failure here is fatal to
    /// the render call that needed the surface.
    pub fn acquire(render_width: u32) -> CardLabResult<Self> {
        let height = card_height(render_width);
        if render_width == 0 || height == 0 {
            return Err(CardLabError::surface("surface dimensions must be > 0"));
        }
        let width_u16: u16 = render_width
            .try_into()
            .map_err(|_| CardLabError::surface("surface width exceeds u16"))?;
        let height_u16: u16 = height
            .try_into()
            .map_err(|_| CardLabError::surface("surface height exceeds u16"))?;

        Ok(Self {
            width: width_u16,
            height: height_u16,
            ctx: vello_cpu::RenderContext::new(width_u16, height_u16),
            pixmap: vello_cpu::Pixmap::new(width_u16, height_u16),
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.width)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.height)
    }

    pub fn ctx(&mut self) -> &mut vello_cpu::RenderContext {
        &mut self.ctx
    }

    /// Flush queued draw ops into the pixmap and return the premultiplied
    /// RGBA8 bytes. The surface can keep receiving draw ops afterwards.
    pub fn capture(&mut self) -> Vec<u8> {
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);
        self.pixmap.data_as_u8_slice().to_vec()
    }
}

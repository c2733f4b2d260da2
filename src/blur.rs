use crate::error::{CardLabError, CardLabResult};

/// Separable gaussian blur over premultiplied RGBA8, used to feather the
/// inpainting mask so the model never sees a hard mask edge.
///
/// The kernel is normalized in Q16 fixed point so the pass is deterministic
/// across platforms; a zero radius returns the input unchanged.
pub fn feather_rgba8(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> CardLabResult<Vec<u8>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| CardLabError::validation("blur buffer size overflow"))?;
    if src.len() != expected {
        return Err(CardLabError::validation(
            "feather_rgba8 expects src matching width*height*4",
        ));
    }
    if radius == 0 {
        return Ok(src.to_vec());
    }

    let kernel = kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected];
    let mut out = vec![0u8; expected];
    axis_pass(src, &mut tmp, width, height, &kernel, Axis::X);
    axis_pass(&tmp, &mut out, width, height, &kernel, Axis::Y);
    Ok(out)
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

fn kernel_q16(radius: u32, sigma: f32) -> CardLabResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(CardLabError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();

    // Quantize to Q16 and push any rounding residue onto the center tap so
    // the kernel sums to exactly 1.0 and flat regions stay flat.
    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|&w| (((w / sum) * 65536.0).round() as i64).clamp(0, 65536) as u32)
        .collect();
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let mid = weights.len() / 2;
    weights[mid] = (i64::from(weights[mid]) + (65536 - acc)).clamp(0, 65536) as u32;
    Ok(weights)
}

fn axis_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, kernel: &[u32], axis: Axis) {
    let radius = (kernel.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in kernel.iter().enumerate() {
                let offset = ki as i32 - radius;
                // Edge taps clamp to the border pixel.
                let (sx, sy) = match axis {
                    Axis::X => ((x + offset).clamp(0, w - 1), y),
                    Axis::Y => (x, (y + offset).clamp(0, h - 1)),
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = ((acc[c] + 32768) >> 16).min(255) as u8;
            }
        }
    }
}

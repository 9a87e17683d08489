// src/vision/resample.rs
//
// Bilinear resize of packed 3-channel images, used to scale camera frames
// into the network input.

const CHANNELS: usize = 3;

/// Where one output coordinate samples from along a single axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    lo: usize,
    hi: usize,
    /// Weight of `hi`; `lo` gets `1 - frac`.
    frac: f32,
}

/// Pixel-centre aligned taps for resizing an axis of `src` samples to `dst`.
///
/// Both neighbours are clamped into `0..src`: with centre alignment the
/// first and last outputs land outside the source grid, and when shrinking
/// the rounding can push `lo` onto the last sample.
fn taps(src: usize, dst: usize) -> Vec<Tap> {
    let ratio = src as f32 / dst as f32;
    let last = src - 1;
    (0..dst)
        .map(|d| {
            let s = ((d as f32 + 0.5) * ratio - 0.5).max(0.0);
            let lo = (s.floor() as usize).min(last);
            Tap {
                lo,
                hi: (lo + 1).min(last),
                frac: (s - lo as f32).clamp(0.0, 1.0),
            }
        })
        .collect()
}

/// Resize a row-major, 3-bytes-per-pixel image. An empty source yields a
/// black image of the requested size.
pub fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_w * dst_h * CHANNELS];
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return dst;
    }

    let columns = taps(src_w, dst_w);
    let rows = taps(src_h, dst_h);
    let at = |x: usize, y: usize, c: usize| src[(y * src_w + x) * CHANNELS + c] as f32;

    for (row, out_row) in rows.iter().zip(dst.chunks_exact_mut(dst_w * CHANNELS)) {
        for (col, out_px) in columns.iter().zip(out_row.chunks_exact_mut(CHANNELS)) {
            for (c, out) in out_px.iter_mut().enumerate() {
                let top = at(col.lo, row.lo, c) * (1.0 - col.frac) + at(col.hi, row.lo, c) * col.frac;
                let bottom = at(col.lo, row.hi, c) * (1.0 - col.frac) + at(col.hi, row.hi, c) * col.frac;
                *out = (top * (1.0 - row.frac) + bottom * row.frac).round() as u8;
            }
        }
    }
    dst
}

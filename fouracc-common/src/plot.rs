//! Plot rendering
//!
//! The default [`PngRenderer`] draws the original series in the top 40% of
//! the canvas and the coefficient heat map in the bottom 60%. NaN padding is
//! drawn black. The plot title (`<name> -- chunks=<c> (freq=<f> Hz)`) is
//! stored in the PNG `Title` text chunk.

use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::spectrum::Spectrum;

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("nothing to draw for {0:?}")]
    Empty(String),

    #[error("could not create output plot: {0}")]
    Encode(#[from] png::EncodingError),
}

/// Keyword of the text chunk holding the plot title
pub const TITLE_KEYWORD: &str = "Title";

/// Plot title: display name, chunk size and sampling frequency when known
pub fn title(spectrum: &Spectrum) -> String {
    match spectrum.scale {
        Some(freq) => format!("{} -- chunks={} (freq={} Hz)", spectrum.name, spectrum.chunk_size, freq),
        None => format!("{} -- chunks={}", spectrum.name, spectrum.chunk_size),
    }
}

/// `tEXt` chunks are Latin-1
fn latin1(text: &str) -> String {
    text.chars().map(|c| if (c as u32) < 0x100 { c } else { '?' }).collect()
}

/// Turns a spectrum into image bytes
pub trait PlotRenderer: Send + Sync {
    fn render(&self, spectrum: &Spectrum) -> Result<Vec<u8>, RenderError>;
}

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([220, 220, 220]);
const TRACE: Rgb<u8> = Rgb([255, 0, 0]);
const MARGIN: u32 = 24;

/// PNG renderer (default canvas 20cm × 30cm at 96 dpi)
#[derive(Debug, Clone, Copy)]
pub struct PngRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for PngRenderer {
    fn default() -> Self {
        Self {
            width: 756,
            height: 1134,
        }
    }
}

impl PlotRenderer for PngRenderer {
    fn render(&self, spectrum: &Spectrum) -> Result<Vec<u8>, RenderError> {
        if spectrum.ys.is_empty() {
            return Err(RenderError::Empty(spectrum.name.clone()));
        }

        let mut img = RgbImage::from_pixel(self.width, self.height, WHITE);
        let split = self.height * 2 / 5;
        let top = Panel::new(MARGIN, MARGIN, self.width - MARGIN, split - MARGIN / 2);
        let bottom = Panel::new(MARGIN, split + MARGIN / 2, self.width - MARGIN, self.height - MARGIN);

        draw_series(&mut img, top, &spectrum.xs, &spectrum.ys);
        draw_heat_map(&mut img, bottom, &spectrum.coeffs);

        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, img.width(), img.height());
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.add_text_chunk(TITLE_KEYWORD.to_string(), latin1(&title(spectrum)))?;
            let mut writer = encoder.write_header()?;
            writer.write_image_data(img.as_raw())?;
            writer.finish()?;
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
struct Panel {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Panel {
    fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1: x1.max(x0 + 1), y1: y1.max(y0 + 1) }
    }

    fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Maps `v` in `[lo, hi]` to `[0, 1]`; a flat range maps to the middle.
fn normalize(v: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn draw_series(img: &mut RgbImage, panel: Panel, xs: &[f64], ys: &[f64]) {
    for i in 0..=4 {
        let y = panel.y0 + panel.height() * i / 4;
        for x in panel.x0..panel.x1 {
            img.put_pixel(x, y.min(panel.y1 - 1), GRID);
        }
        let x = panel.x0 + panel.width() * i / 4;
        for y in panel.y0..panel.y1 {
            img.put_pixel(x.min(panel.x1 - 1), y, GRID);
        }
    }

    let (Some((xlo, xhi)), Some((ylo, yhi))) = (
        finite_range(xs.iter().copied()),
        finite_range(ys.iter().copied()),
    ) else {
        return;
    };

    let to_pixel = |x: f64, y: f64| {
        let px = panel.x0 as f64 + normalize(x, xlo, xhi) * (panel.width() - 1) as f64;
        let py = panel.y1 as f64 - 1.0 - normalize(y, ylo, yhi) * (panel.height() - 1) as f64;
        (px, py)
    };

    let mut prev: Option<(f64, f64)> = None;
    for (&x, &y) in xs.iter().zip(ys) {
        if !x.is_finite() || !y.is_finite() {
            prev = None;
            continue;
        }
        let cur = to_pixel(x, y);
        match prev {
            Some(p) => draw_line(img, p, cur, TRACE),
            None => img.put_pixel(cur.0 as u32, cur.1 as u32, TRACE),
        }
        prev = Some(cur);
    }
}

fn draw_line(img: &mut RgbImage, from: (f64, f64), to: (f64, f64), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
    for s in 0..=steps {
        let t = s as f64 / steps as f64;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        if x >= 0.0 && y >= 0.0 && (x as u32) < img.width() && (y as u32) < img.height() {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Chunks run along x, frequency bins along y (low frequencies at the bottom).
fn draw_heat_map(img: &mut RgbImage, panel: Panel, coeffs: &[Vec<f64>]) {
    let cols = coeffs.len();
    let rows = coeffs.first().map_or(0, Vec::len);
    if cols == 0 || rows == 0 {
        return;
    }
    let (lo, hi) = finite_range(coeffs.iter().flatten().copied()).unwrap_or((0.0, 0.0));

    for py in panel.y0..panel.y1 {
        let fy = (panel.y1 - 1 - py) as usize * rows / panel.height() as usize;
        for px in panel.x0..panel.x1 {
            let cx = (px - panel.x0) as usize * cols / panel.width() as usize;
            let v = coeffs[cx.min(cols - 1)][fy.min(rows - 1)];
            let color = if v.is_finite() {
                rainbow(normalize(v, lo, hi))
            } else {
                BLACK
            };
            img.put_pixel(px, py, color);
        }
    }
}

/// Rainbow palette: 0 is red, 1 is magenta (hue 0°–300°).
fn rainbow(t: f64) -> Rgb<u8> {
    let h = t.clamp(0.0, 1.0) * 300.0 / 60.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        _ => (x, 0.0, 1.0),
    };
    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::chunked_fft;

    #[test]
    fn test_render_png_signature() {
        let xs: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| (x * 0.3).sin()).collect();
        let spectrum = chunked_fft("sine", 16, &xs, &ys, None).unwrap();
        let renderer = PngRenderer { width: 120, height: 180 };
        let png = renderer.render(&spectrum).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_title_text_chunk() {
        let xs: Vec<f64> = (0..32).map(|i| i as f64).collect();
        let spectrum = chunked_fft("bench.msr [axis=y]", 8, &xs, &xs, Some(50.0)).unwrap();
        let png_bytes = PngRenderer { width: 80, height: 120 }.render(&spectrum).unwrap();

        let reader = png::Decoder::new(std::io::Cursor::new(&png_bytes))
            .read_info()
            .unwrap();
        let chunk = reader
            .info()
            .uncompressed_latin1_text
            .iter()
            .find(|chunk| chunk.keyword == TITLE_KEYWORD)
            .expect("Title chunk should be present");
        assert_eq!(chunk.text, "bench.msr [axis=y] -- chunks=8 (freq=50 Hz)");
    }

    #[test]
    fn test_title_without_frequency() {
        let xs: Vec<f64> = (0..4).map(|i| i as f64).collect();
        let spectrum = chunked_fft("series.csv", 4, &xs, &xs, None).unwrap();
        assert_eq!(title(&spectrum), "series.csv -- chunks=4");
        assert_eq!(latin1("acc-\u{03c9}.csv"), "acc-?.csv");
    }

    #[test]
    fn test_rainbow_ends() {
        assert_eq!(rainbow(0.0), Rgb([255, 0, 0]));
        assert_eq!(rainbow(1.0), Rgb([255, 0, 255]));
    }

    #[test]
    fn test_normalize_flat_range() {
        assert_eq!(normalize(3.0, 3.0, 3.0), 0.5);
        assert_eq!(normalize(5.0, 0.0, 10.0), 0.5);
    }
}

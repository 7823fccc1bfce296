/// RGB8 pixel.
pub type Rgb = [u8; 3];

/// The "unmapped" pixel value produced by [`crate::warp`].
pub const BLACK: Rgb = [0, 0, 0];

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[derive(Clone, Copy, Debug)]
pub struct RgbImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h*3
}

impl RgbImageView<'_> {
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Bilinear sample at a sub-pixel position.
    ///
    /// Returns `None` when the position lies outside the pixel grid, which
    /// the warp turns into a black pixel.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<Rgb> {
        if self.width == 0 || self.height == 0 || !x.is_finite() || !y.is_finite() {
            return None;
        }
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        if x < 0.0 || y < 0.0 || x > max_x || y > max_y {
            return None;
        }

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x1, y0);
        let p01 = self.pixel(x0, y1);
        let p11 = self.pixel(x1, y1);

        let mut out = BLACK;
        for c in 0..3 {
            let a = p00[c] as f64 + fx * (p10[c] as f64 - p00[c] as f64);
            let b = p01[c] as f64 + fx * (p11[c] as f64 - p01[c] as f64);
            out[c] = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
        }
        Some(out)
    }

    /// Luma conversion with BT.601 weights.
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(3)
            .map(|p| {
                let y = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbImage {
    /// All-black image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    /// Wrap a raw row-major RGB buffer, checking its length.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        let expected = width.checked_mul(height)?.checked_mul(3)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> RgbImageView<'_> {
        RgbImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        self.view().pixel(x, y)
    }

    #[inline]
    pub fn put_pixel(&mut self, x: usize, y: usize, px: Rgb) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&px);
    }

    /// Draw a filled disc, clipped to the image bounds.
    pub fn draw_disc(&mut self, cx: i64, cy: i64, radius: i64, color: Rgb) {
        let r2 = radius * radius;
        let x_lo = cx.saturating_sub(radius).max(0);
        let y_lo = cy.saturating_sub(radius).max(0);
        let x_hi = cx.saturating_add(radius).min(self.width as i64 - 1);
        let y_hi = cy.saturating_add(radius).min(self.height as i64 - 1);
        if x_lo > x_hi || y_lo > y_hi {
            return;
        }
        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy <= r2 {
                    self.put_pixel(x as usize, y as usize, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_rgb_interpolates_between_neighbours() {
        let img = RgbImage::from_raw(2, 1, vec![0, 0, 0, 100, 200, 50]).expect("buffer");
        let v = img.view();
        assert_eq!(v.sample_bilinear(0.5, 0.0), Some([50, 100, 25]));
        assert_eq!(v.sample_bilinear(1.0, 0.0), Some([100, 200, 50]));
        assert_eq!(v.sample_bilinear(1.5, 0.0), None);
        assert_eq!(v.sample_bilinear(-0.1, 0.0), None);
    }

    #[test]
    fn disc_is_clipped_at_image_border() {
        let mut img = RgbImage::new(4, 4);
        img.draw_disc(0, 0, 1, [9, 9, 9]);
        assert_eq!(img.pixel(0, 0), [9, 9, 9]);
        assert_eq!(img.pixel(1, 0), [9, 9, 9]);
        assert_eq!(img.pixel(0, 1), [9, 9, 9]);
        assert_eq!(img.pixel(1, 1), BLACK);
    }

    #[test]
    fn disc_far_outside_the_image_draws_nothing() {
        let mut img = RgbImage::new(4, 4);
        img.draw_disc(i64::MAX, 1, 5, [9, 9, 9]);
        img.draw_disc(i64::MIN, i64::MIN, 5, [9, 9, 9]);
        img.draw_disc(2, i64::MAX, 5, [9, 9, 9]);
        img.draw_disc(-6, 2, 5, [9, 9, 9]);
        assert!(img.data.iter().all(|&v| v == 0));

        img.draw_disc(-5, 2, 5, [9, 9, 9]);
        assert_eq!(img.pixel(0, 2), [9, 9, 9]);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(RgbImage::from_raw(2, 2, vec![0; 11]).is_none());
    }

    #[test]
    fn gray_conversion_uses_luma_weights() {
        let img = RgbImage::from_raw(1, 1, vec![255, 255, 255]).expect("buffer");
        assert_eq!(img.view().to_gray().data, vec![255]);
        let red = RgbImage::from_raw(1, 1, vec![255, 0, 0]).expect("buffer");
        assert_eq!(red.view().to_gray().data, vec![76]);
    }
}

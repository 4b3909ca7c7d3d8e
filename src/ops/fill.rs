use image::{Rgba, RgbaImage};

/// Exact-match, 4-connected flood fill starting at `(start_x, start_y)`.
///
/// The seed pixel's full RGBA value is the target; only pixels equal to it in
/// all four channels are replaced. Fill pixels are written fully opaque. If
/// the target already equals the (opaque) fill color nothing happens, which
/// also guarantees that a written pixel can never match the target again.
///
/// Uses an explicit Vec stack of packed flat indices instead of recursion.
/// Returns the number of pixels filled.
pub fn flood_fill(pixels: &mut RgbaImage, start_x: i32, start_y: i32, color: Rgba<u8>) -> usize {
    let (w, h) = pixels.dimensions();
    if start_x < 0 || start_y < 0 || start_x as u32 >= w || start_y as u32 >= h {
        return 0;
    }

    let fill = Rgba([color[0], color[1], color[2], 255]);
    let target = *pixels.get_pixel(start_x as u32, start_y as u32);
    if target == fill {
        return 0;
    }

    let wu = w as usize;
    let hu = h as usize;
    let data: &mut [u8] = pixels;

    #[inline(always)]
    fn matches(data: &[u8], idx: usize, target: &Rgba<u8>) -> bool {
        let o = idx * 4;
        data[o..o + 4] == target.0
    }

    #[inline(always)]
    fn write(data: &mut [u8], idx: usize, fill: &Rgba<u8>) {
        let o = idx * 4;
        data[o..o + 4].copy_from_slice(&fill.0);
    }

    let seed = start_y as usize * wu + start_x as usize;
    let mut filled = 1;
    let mut stack: Vec<usize> = Vec::with_capacity(256);
    write(data, seed, &fill);
    stack.push(seed);

    while let Some(idx) = stack.pop() {
        let x = idx % wu;
        let y = idx / wu;

        // Left, right, up, down. Written on push, so each pixel is visited once
        let neighbours = [
            (x > 0).then(|| idx - 1),
            (x + 1 < wu).then(|| idx + 1),
            (y > 0).then(|| idx - wu),
            (y + 1 < hu).then(|| idx + wu),
        ];
        for ni in neighbours.into_iter().flatten() {
            if matches(data, ni, &target) {
                write(data, ni, &fill);
                stack.push(ni);
                filled += 1;
            }
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    #[test]
    fn fills_only_the_connected_component() {
        // A vertical wall at x = 4 splits an 8×4 image into two regions.
        let mut img = RgbaImage::new(8, 4);
        for y in 0..4 {
            img.put_pixel(4, y, BLUE);
        }
        let filled = flood_fill(&mut img, 0, 0, RED);
        assert_eq!(filled, 16);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(*img.get_pixel(x, y), RED);
            }
            assert_eq!(*img.get_pixel(4, y), BLUE);
            for x in 5..8 {
                assert_eq!(img.get_pixel(x, y)[3], 0);
            }
        }
    }

    #[test]
    fn diagonal_neighbours_are_not_connected() {
        let mut img = RgbaImage::new(3, 3);
        // Checkerboard of blue on transparent: (0,0) touches (1,1) only diagonally.
        for (x, y) in [(0, 0), (1, 1), (2, 2), (2, 0), (0, 2)] {
            img.put_pixel(x, y, BLUE);
        }
        assert_eq!(flood_fill(&mut img, 0, 0, RED), 1);
        assert_eq!(*img.get_pixel(1, 1), BLUE);
    }

    #[test]
    fn exact_match_includes_alpha() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([10, 10, 10, 200]));
        img.put_pixel(1, 0, Rgba([10, 10, 10, 199]));
        assert_eq!(flood_fill(&mut img, 0, 0, RED), 1);
        assert_eq!(*img.get_pixel(1, 0), Rgba([10, 10, 10, 199]));
    }

    #[test]
    fn translucent_fill_color_still_terminates() {
        let mut img = RgbaImage::new(4, 4);
        for p in img.pixels_mut() {
            *p = RED;
        }
        // Effective fill is opaque red, equal to the target: no-op.
        assert_eq!(flood_fill(&mut img, 1, 1, Rgba([255, 0, 0, 10])), 0);
    }

    #[test]
    fn out_of_bounds_seed_is_noop() {
        let mut img = RgbaImage::new(4, 4);
        assert_eq!(flood_fill(&mut img, -1, 0, RED), 0);
        assert_eq!(flood_fill(&mut img, 0, 4, RED), 0);
    }

    #[test]
    fn large_region_does_not_recurse() {
        let mut img = RgbaImage::new(512, 512);
        assert_eq!(flood_fill(&mut img, 256, 256, RED), 512 * 512);
    }
}

//! Pixel data for the engine's built-in textures.
//!
//! Colors are packed as `0xAABBGGRR`, so on little-endian hosts the bytes of a
//! `u32` slice are already in `R8G8B8A8` order.

/// Opaque white.
pub const WHITE: u32 = 0xFFFF_FFFF;
/// Opaque black.
pub const BLACK: u32 = 0xFF00_0000;
/// Opaque magenta.
pub const MAGENTA: u32 = 0xFFFF_00FF;
/// Tangent-space normal pointing straight out of the surface.
pub const FLAT_NORMAL: u32 = 0xFFFF_8080;

/// Side length of the error checkerboard.
pub const CHECKERBOARD_SIZE: u32 = 16;

/// RGBA8 pixels with their dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// Tightly packed `R8G8B8A8` rows.
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// A 1x1 image of `color`.
    pub fn solid(color: u32) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: color.to_le_bytes().to_vec(),
        }
    }

    /// Magenta/black checkerboard shown in place of textures that failed to
    /// load.
    pub fn checkerboard() -> Self {
        let pixels = checkerboard_pixels(CHECKERBOARD_SIZE);
        Self {
            width: CHECKERBOARD_SIZE,
            height: CHECKERBOARD_SIZE,
            pixels: pixels.iter().flat_map(|p| p.to_le_bytes()).collect(),
        }
    }

    /// Byte size of the pixel data.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Packed colors of a `size`x`size` checkerboard, row-major. Texel `(x, y)`
/// is magenta when `(x % 2) ^ (y % 2)` is set.
pub fn checkerboard_pixels(size: u32) -> Vec<u32> {
    (0..size)
        .flat_map(|y| {
            (0..size).map(move |x| {
                if ((x % 2) ^ (y % 2)) != 0 {
                    MAGENTA
                } else {
                    BLACK
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_byte_order() {
        assert_eq!(ImageData::solid(FLAT_NORMAL).pixels, vec![0x80, 0x80, 0xFF, 0xFF]);
        assert_eq!(ImageData::solid(BLACK).pixels, vec![0, 0, 0, 0xFF]);
        assert_eq!(ImageData::solid(WHITE).pixels, vec![0xFF; 4]);
    }

    #[test]
    fn test_checkerboard_pattern() {
        let pixels = checkerboard_pixels(CHECKERBOARD_SIZE);
        assert_eq!(pixels.len(), 256);
        assert_eq!(pixels[0], BLACK);
        assert_eq!(pixels[1], MAGENTA);
        assert_eq!(pixels[16], MAGENTA);
        assert_eq!(pixels[17], BLACK);
    }

    #[test]
    fn test_checkerboard_image() {
        let image = ImageData::checkerboard();
        assert_eq!((image.width, image.height), (16, 16));
        assert_eq!(image.byte_size(), 16 * 16 * 4);
        assert_eq!(&image.pixels[4..8], &[0xFF, 0x00, 0xFF, 0xFF]);
    }
}

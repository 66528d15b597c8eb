use image::{ImageBuffer, Rgb};
use nalgebra::{Matrix4, Point3};

/// Samples an affine-transformed crop out of the source frame.
///
/// Each output pixel's unit-square UV is mapped through `xform` to source
/// UV and bilinear-sampled with clamp-to-edge. This is the CPU stand-in
/// for the preprocess blit of a GPU pipeline; detectors only see the
/// fixed-size crops it produces.
pub fn warp_crop(
    frame: &ImageBuffer<Rgb<u8>, Vec<u8>>,
    xform: &Matrix4<f32>,
    size: u32,
) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    ImageBuffer::from_fn(size, size, |x, y| {
        let u = (x as f32 + 0.5) / size as f32;
        let v = (y as f32 + 0.5) / size as f32;
        let src = xform.transform_point(&Point3::new(u, v, 0.0));
        sample_bilinear(frame, src.x * w - 0.5, src.y * h - 0.5)
    })
}

fn sample_bilinear(frame: &ImageBuffer<Rgb<u8>, Vec<u8>>, x: f32, y: f32) -> Rgb<u8> {
    let max_x = frame.width() as i64 - 1;
    let max_y = frame.height() as i64 - 1;
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let pix = |px: i64, py: i64| -> [f32; 3] {
        let cx = px.clamp(0, max_x) as u32;
        let cy = py.clamp(0, max_y) as u32;
        let p = frame.get_pixel(cx, cy);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let p00 = pix(x0, y0);
    let p10 = pix(x0 + 1, y0);
    let p01 = pix(x0, y0 + 1);
    let p11 = pix(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::crop_matrix;
    use nalgebra::Vector2;

    fn gradient_frame(w: u32, h: u32) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
        ImageBuffer::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 0])
        })
    }

    #[test]
    fn identity_crop_reproduces_frame_corners() {
        let frame = gradient_frame(64, 64);
        let m = crop_matrix(0.0, Vector2::new(1.0, 1.0), Vector2::new(0.0, 0.0));
        let crop = warp_crop(&frame, &m, 64);
        assert_eq!(crop.get_pixel(0, 0), frame.get_pixel(0, 0));
        assert_eq!(crop.get_pixel(63, 63), frame.get_pixel(63, 63));
    }

    #[test]
    fn offset_crop_samples_the_right_region() {
        let frame = gradient_frame(100, 100);
        // right half of the frame
        let m = crop_matrix(0.0, Vector2::new(0.5, 0.5), Vector2::new(0.5, 0.25));
        let crop = warp_crop(&frame, &m, 50);
        let left_edge = crop.get_pixel(0, 25)[0] as f32;
        assert!(
            (left_edge - 127.0).abs() < 10.0,
            "crop left edge sampled red {} (expected ~mid gradient)",
            left_edge
        );
    }

    #[test]
    fn out_of_bounds_sampling_clamps_to_edge() {
        let frame = gradient_frame(32, 32);
        let m = crop_matrix(0.0, Vector2::new(2.0, 2.0), Vector2::new(-0.5, -0.5));
        let crop = warp_crop(&frame, &m, 32);
        // all samples stay valid pixels even though the crop overshoots
        assert_eq!(crop.get_pixel(0, 0), frame.get_pixel(0, 0));
    }
}

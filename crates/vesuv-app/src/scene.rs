// SPDX-License-Identifier: CEPL-1.0
//! Demo geometry and its per-frame transforms.
use std::path::Path;

use glam::{Mat4, Vec3};
use image::{Rgba, RgbaImage};
use tracing::warn;
use vesuv_render_vk::{decode_texture, UniformBufferObject, Vertex};

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex::new([0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([-0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.0, 1.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
];

const LIGHT: Rgba<u8> = Rgba([230, 230, 230, 255]);
const DARK: Rgba<u8> = Rgba([40, 40, 40, 255]);

/// `size`×`size` texels of alternating `cell`-sized squares, light at the origin.
pub fn checkerboard(size: u32, cell: u32) -> RgbaImage {
    let cell = cell.max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            LIGHT
        } else {
            DARK
        }
    })
}

/// The configured image, or the checkerboard when none is set or it fails
/// to decode.
pub fn texture_pixels(path: Option<&Path>) -> RgbaImage {
    match path.map(decode_texture) {
        Some(Ok(img)) => img,
        Some(Err(e)) => {
            warn!("{e:#}; using the checkerboard");
            checkerboard(256, 32)
        }
        None => checkerboard(256, 32),
    }
}

/// Degrees per second about +Z.
const SPIN_RATE: f32 = 90.0;
const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);

/// Model spins about Z, camera at (2,2,2) looking at the origin with Z up,
/// 45° vertical field of view. Y is flipped for Vulkan clip space.
pub fn transforms(elapsed_secs: f32, width: u32, height: u32) -> UniformBufferObject {
    let model = Mat4::from_rotation_z((elapsed_secs * SPIN_RATE).to_radians());
    let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
    proj.y_axis.y *= -1.0;

    UniformBufferObject {
        model: model.to_cols_array_2d(),
        view: view.to_cols_array_2d(),
        proj: proj.to_cols_array_2d(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn quad_indices_cover_both_triangles() {
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
        assert_eq!(QUAD_INDICES.len(), 6);
    }

    #[test]
    fn model_is_identity_at_start() {
        let ubo = transforms(0.0, 800, 600);
        assert_eq!(Mat4::from_cols_array_2d(&ubo.model), Mat4::IDENTITY);
    }

    #[test]
    fn one_second_is_a_quarter_turn() {
        let ubo = transforms(1.0, 800, 600);
        let model = Mat4::from_cols_array_2d(&ubo.model);
        let x = model.transform_point3(Vec3::X);
        assert!(close(x.x, 0.0) && close(x.y, 1.0), "{x}");
    }

    #[test]
    fn projection_flips_y() {
        let ubo = transforms(0.0, 800, 600);
        let proj = Mat4::from_cols_array_2d(&ubo.proj);
        assert!(proj.y_axis.y < 0.0);
        assert!(close(proj.x_axis.x * 800.0 / 600.0, -proj.y_axis.y));
    }

    #[test]
    fn checkerboard_alternates_by_cell() {
        let img = checkerboard(8, 2);
        assert_eq!(img.dimensions(), (8, 8));
        assert_eq!(*img.get_pixel(0, 0), LIGHT);
        assert_eq!(*img.get_pixel(1, 1), LIGHT);
        assert_eq!(*img.get_pixel(2, 0), DARK);
        assert_eq!(*img.get_pixel(0, 2), DARK);
        assert_eq!(*img.get_pixel(2, 2), LIGHT);
    }

    #[test]
    fn unreadable_texture_falls_back_to_checkerboard() {
        let img = texture_pixels(Some(Path::new("no/such/texture.png")));
        assert_eq!(img, checkerboard(256, 32));
        assert_eq!(texture_pixels(None).dimensions(), (256, 256));
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let ubo = transforms(0.0, 800, 0);
        assert!(ubo.proj.iter().flatten().all(|v| v.is_finite()));
    }
}

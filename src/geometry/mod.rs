//! Small geometric helpers shared by the camera models and the refiners.

use nalgebra::{Matrix3, Vector2, Vector3};

pub mod pose;

pub use pose::CameraPose;

/// Cross-product matrix `[v]×`, so that `skew_symmetric(a) * b == a.cross(&b)`.
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Generate a grid of sample points that are evenly distributed across the image
///
/// # Arguments
///
/// * `width` - The width of the image in pixels
/// * `height` - The height of the image in pixels
/// * `n` - The approximate number of points to generate
///
/// # Returns
///
/// The pixel coordinates at the center of each grid cell, row by row.
pub fn sample_points(width: f64, height: f64, n: usize) -> Vec<Vector2<f64>> {
    if n == 0 || width <= 0.0 || height <= 0.0 {
        return Vec::new();
    }

    let num_cells_x = ((n as f64 * (width / height)).sqrt().round() as usize).max(1);
    let num_cells_y = ((n as f64 * (height / width)).sqrt().round() as usize).max(1);

    let cell_width = width / num_cells_x as f64;
    let cell_height = height / num_cells_y as f64;

    (0..num_cells_y)
        .flat_map(|i| {
            (0..num_cells_x).map(move |j| {
                Vector2::new(
                    (j as f64 + 0.5) * cell_width,
                    (i as f64 + 0.5) * cell_height,
                )
            })
        })
        .collect()
}

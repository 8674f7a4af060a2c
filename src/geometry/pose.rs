use nalgebra::{Matrix3x4, UnitQuaternion, Vector3};

/// Rigid transform from world to camera coordinates: `X_cam = R·X_world + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub q: UnitQuaternion<f64>,
    pub t: Vector3<f64>,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

impl CameraPose {
    /// World-to-camera pose `x ↦ q·x + t`.
    pub fn new(q: UnitQuaternion<f64>, t: Vector3<f64>) -> Self {
        CameraPose { q, t }
    }

    pub fn identity() -> Self {
        CameraPose {
            q: UnitQuaternion::identity(),
            t: Vector3::zeros(),
        }
    }

    /// Builds the pose of a camera with orientation `q` located at `center`
    /// in world coordinates.
    pub fn from_center(q: UnitQuaternion<f64>, center: &Vector3<f64>) -> Self {
        CameraPose { q, t: -(q * center) }
    }

    /// Rotates `x` into the camera frame without translating it.
    pub fn rotate(&self, x: &Vector3<f64>) -> Vector3<f64> {
        self.q * x
    }

    /// Inverse of [`CameraPose::rotate`].
    pub fn derotate(&self, x: &Vector3<f64>) -> Vector3<f64> {
        self.q.inverse() * x
    }

    /// Maps a world point into camera coordinates.
    pub fn apply(&self, x: &Vector3<f64>) -> Vector3<f64> {
        self.q * x + self.t
    }

    /// Camera center in world coordinates, `-Rᵀt`.
    pub fn center(&self) -> Vector3<f64> {
        -self.derotate(&self.t)
    }

    /// Camera-to-world pose, so that `inverse().apply(apply(x)) == x`.
    pub fn inverse(&self) -> CameraPose {
        let q_inv = self.q.inverse();
        CameraPose {
            q: q_inv,
            t: -(q_inv * self.t),
        }
    }

    /// `self ∘ other`: applies `other` first.
    pub fn compose(&self, other: &CameraPose) -> CameraPose {
        CameraPose {
            q: self.q * other.q,
            t: self.q * other.t + self.t,
        }
    }

    /// `[R | t]`
    pub fn matrix(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.q.to_rotation_matrix().matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.t);
        m
    }
}

//! Local transformation data for scene nodes.
//!
//! A node's local transform is either a translation/rotation/scale triple or an
//! explicit matrix. Setting one form replaces the other; reading TRS out of an
//! explicit matrix decomposes it.

use cgmath::{InnerSpace, Matrix3, Matrix4, One, Quaternion, SquareMatrix, Vector3};

/// Translation, rotation (as quaternion) and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Transform {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            translation: Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// `T * R * S`
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Splits an affine matrix into TRS. Shear is lost; a negative determinant
    /// is folded into the x scale.
    pub fn from_matrix(matrix: &Matrix4<f32>) -> Self {
        let translation = matrix.w.truncate();
        let mut scale = Vector3::new(
            matrix.x.truncate().magnitude(),
            matrix.y.truncate().magnitude(),
            matrix.z.truncate().magnitude(),
        );
        if matrix.determinant() < 0.0 {
            scale.x = -scale.x;
        }
        let safe = |s: f32| if s.abs() > f32::EPSILON { s } else { 1.0 };
        let rotation = Matrix3::from_cols(
            matrix.x.truncate() / safe(scale.x),
            matrix.y.truncate() / safe(scale.y),
            matrix.z.truncate() / safe(scale.z),
        );
        Self {
            translation,
            rotation: Quaternion::from(rotation).normalize(),
            scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a node's local matrix comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocalTransform {
    Trs(Transform),
    Matrix(Matrix4<f32>),
}

impl Default for LocalTransform {
    fn default() -> Self {
        LocalTransform::Trs(Transform::default())
    }
}

impl LocalTransform {
    pub fn to_matrix(&self) -> Matrix4<f32> {
        match self {
            LocalTransform::Trs(trs) => trs.to_matrix(),
            LocalTransform::Matrix(matrix) => *matrix,
        }
    }

    pub fn to_trs(&self) -> Transform {
        match self {
            LocalTransform::Trs(trs) => *trs,
            LocalTransform::Matrix(matrix) => Transform::from_matrix(matrix),
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Rotation3};

    use super::*;

    fn assert_mat_eq(a: Matrix4<f32>, b: Matrix4<f32>) {
        let a: [[f32; 4]; 4] = a.into();
        let b: [[f32; 4]; 4] = b.into();
        for (ca, cb) in a.iter().zip(b.iter()) {
            for (x, y) in ca.iter().zip(cb.iter()) {
                assert!((x - y).abs() < 1e-4, "{a:?} != {b:?}");
            }
        }
    }

    #[test]
    fn decomposing_a_trs_matrix_round_trips() {
        let trs = Transform {
            translation: Vector3::new(1.0, -2.0, 3.0),
            rotation: Quaternion::from_angle_y(Deg(30.0)),
            scale: Vector3::new(2.0, 2.0, 0.5),
        };
        let decomposed = Transform::from_matrix(&trs.to_matrix());
        assert_mat_eq(decomposed.to_matrix(), trs.to_matrix());
    }
}

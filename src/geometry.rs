//! Pose and projection helpers shared by the hosting and resolving pipelines
//!
//! Poses are rigid transforms (translation + unit quaternion) expressed in the
//! tracking session's world space. Visibility checks follow the clip-space
//! convention of the camera projection: a point is on screen when its
//! homogeneous `w` is positive and both normalized coordinates lie in [-1, 1].

use bevy::math::{Mat4, Quat, Vec3, Vec4};

/// Direction a resolved overlay faces in its own model space
pub const OVERLAY_NATIVE_FACING: Vec3 = Vec3::X;

/// Rigid transform in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation: rotation.normalize(),
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: rotation.normalize(),
        }
    }

    /// `self ∘ other`: applies `other` first, then `self`
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            translation: self.translation + self.rotation * other.translation,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            translation: rotation * -self.translation,
            rotation,
        }
    }

    /// Same position, identity orientation
    pub fn extract_translation(&self) -> Pose {
        Pose::from_translation(self.translation)
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * point
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    pub fn distance_squared(&self, other: &Pose) -> f32 {
        self.translation.distance_squared(other.translation)
    }
}

/// Shortest-arc rotation taking direction `from` onto direction `to`
///
/// Degenerate (zero-length) inputs yield the identity rotation.
pub fn rotate_between(from: Vec3, to: Vec3) -> Quat {
    let (Some(from), Some(to)) = (from.try_normalize(), to.try_normalize()) else {
        return Quat::IDENTITY;
    };
    Quat::from_rotation_arc(from, to)
}

/// Pose that keeps the anchor's position but turns the overlay toward the
/// camera around the vertical axis only.
pub fn camera_facing_pose(anchor: &Pose, camera: &Pose) -> Pose {
    let anchor_position = anchor.extract_translation();
    let mut object_to_camera = anchor_position.inverse().compose(camera).translation;
    object_to_camera.y = 0.0;

    // quad geometry is authored in the XY plane, a quarter turn about +Y
    // lines it up with the native facing
    let quarter_turn = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);

    anchor_position
        .compose(&Pose::from_rotation(rotate_between(
            OVERLAY_NATIVE_FACING,
            object_to_camera,
        )))
        .compose(&Pose::from_rotation(quarter_turn))
}

/// Screen-space visibility test against a combined view-projection matrix
pub fn is_world_position_visible(view_projection: &Mat4, world_position: Vec3) -> bool {
    let clip: Vec4 = *view_projection * world_position.extend(1.0);
    if clip.w <= 0.0 {
        return false;
    }
    let x = clip.x / clip.w;
    let y = clip.y / clip.w;
    (-1.0..=1.0).contains(&x) && (-1.0..=1.0).contains(&y)
}

/// Camera state for one tick
#[derive(Debug, Clone, Copy)]
pub struct CameraView {
    pub pose: Pose,
    pub view: Mat4,
    pub projection: Mat4,
}

impl CameraView {
    pub fn new(pose: Pose, view: Mat4, projection: Mat4) -> Self {
        Self {
            pose,
            view,
            projection,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn is_visible(&self, world_position: Vec3) -> bool {
        is_world_position_visible(&self.view_projection(), world_position)
    }

    pub fn distance_squared_to(&self, world_position: Vec3) -> f32 {
        self.pose.translation.distance_squared(world_position)
    }
}

//! Pose math and LHS/RHS pose blending.

use crate::animation::clip::{AnimationClip, JointFrame, MorphFrame};
use serde::{Deserialize, Serialize};

/// Unit quaternion rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians about a unit `axis`.
    pub fn from_axis_angle(axis: [f32; 3], angle: f32) -> Self {
        let half = angle * 0.5;
        let s = half.sin();
        Self {
            x: axis[0] * s,
            y: axis[1] * s,
            z: axis[2] * s,
            w: half.cos(),
        }
    }

    pub fn dot(&self, other: &Quat) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn normalize(&self) -> Quat {
        let len = self.dot(self).sqrt();
        if len <= f32::EPSILON {
            return Quat::IDENTITY;
        }
        Quat {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
            w: self.w / len,
        }
    }

    /// Spherical linear interpolation along the shorter arc.
    pub fn slerp(&self, other: &Quat, t: f32) -> Quat {
        let mut dot = self.dot(other);
        let other = if dot < 0.0 {
            dot = -dot;
            Quat::new(-other.x, -other.y, -other.z, -other.w)
        } else {
            *other
        };

        if dot > 0.9995 {
            return Quat {
                x: self.x + (other.x - self.x) * t,
                y: self.y + (other.y - self.y) * t,
                z: self.z + (other.z - self.z) * t,
                w: self.w + (other.w - self.w) * t,
            }
            .normalize();
        }

        let theta_0 = dot.acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();
        let s1 = theta.sin() / sin_theta_0;
        let s0 = theta.cos() - dot * s1;

        Quat {
            x: self.x * s0 + other.x * s1,
            y: self.y * s0 + other.y * s1,
            z: self.z * s0 + other.z * s1,
            w: self.w * s0 + other.w * s1,
        }
    }
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Blend two joint frames. Joints missing from `rhs` keep the `lhs` rotation.
pub fn blend_joints(lhs: &JointFrame, rhs: &JointFrame, weight: f64) -> JointFrame {
    let t = weight.clamp(0.0, 1.0) as f32;
    let rotations = lhs
        .rotations
        .iter()
        .enumerate()
        .map(|(i, a)| match rhs.rotations.get(i) {
            Some(b) => a.slerp(b, t),
            None => *a,
        })
        .collect();
    JointFrame {
        rotations,
        root_translation: lerp3(lhs.root_translation, rhs.root_translation, t),
    }
}

/// Blend two morph-target weight vectors element-wise.
pub fn blend_morphs(lhs: &MorphFrame, rhs: &MorphFrame, weight: f64) -> MorphFrame {
    let t = weight.clamp(0.0, 1.0) as f32;
    let len = lhs.weights.len().max(rhs.weights.len());
    let weights = (0..len)
        .map(|i| {
            let a = lhs.weights.get(i).copied().unwrap_or(0.0);
            let b = rhs.weights.get(i).copied().unwrap_or(0.0);
            a + (b - a) * t
        })
        .collect();
    MorphFrame { weights }
}

/// Per-tick output of the blend runtime: two cursors and a weight per channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Evaluation {
    pub lhs_joint_time: f64,
    pub rhs_joint_time: f64,
    pub joint_weight: f64,
    pub lhs_morph_time: f64,
    pub rhs_morph_time: f64,
    pub morph_weight: f64,
}

/// Final pose handed to the skinning and morph evaluator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendedPose {
    pub joints: Option<JointFrame>,
    pub morphs: Option<MorphFrame>,
}

/// Sample both clips at the evaluation cursors and blend them.
///
/// Fractional cursors are floored and clamped to the last frame. An empty RHS
/// channel falls back to the LHS data; an empty LHS channel yields `None`.
pub fn sample_pose(lhs: &AnimationClip, rhs: &AnimationClip, eval: &Evaluation) -> BlendedPose {
    let joints = lhs.joint_frame_at(eval.lhs_joint_time).map(|a| {
        let b = rhs.joint_frame_at(eval.rhs_joint_time).unwrap_or(a);
        blend_joints(a, b, eval.joint_weight)
    });
    let morphs = lhs.morph_frame_at(eval.lhs_morph_time).map(|a| {
        let b = rhs.morph_frame_at(eval.rhs_morph_time).unwrap_or(a);
        blend_morphs(a, b, eval.morph_weight)
    });
    BlendedPose { joints, morphs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_slerp_endpoints() {
        let a = Quat::IDENTITY;
        let b = Quat::from_axis_angle([0.0, 1.0, 0.0], FRAC_PI_2);
        assert_eq!(a.slerp(&b, 0.0), a);
        let end = a.slerp(&b, 1.0);
        assert!(approx(end.y, b.y) && approx(end.w, b.w));
    }

    #[test]
    fn test_slerp_halfway_is_half_angle() {
        let a = Quat::IDENTITY;
        let b = Quat::from_axis_angle([0.0, 0.0, 1.0], FRAC_PI_2);
        let mid = a.slerp(&b, 0.5);
        let expected = Quat::from_axis_angle([0.0, 0.0, 1.0], FRAC_PI_2 / 2.0);
        assert!(approx(mid.z, expected.z));
        assert!(approx(mid.w, expected.w));
        assert!(approx(mid.dot(&mid), 1.0));
    }

    #[test]
    fn test_slerp_takes_short_arc() {
        let a = Quat::IDENTITY;
        let b = Quat::new(0.0, 0.0, 0.0, -1.0);
        let mid = a.slerp(&b, 0.5);
        assert!(approx(mid.w, 1.0));
    }

    #[test]
    fn test_blend_morphs_pads_shorter_vector() {
        let lhs = MorphFrame {
            weights: vec![0.0, 1.0],
        };
        let rhs = MorphFrame {
            weights: vec![1.0, 1.0, 0.5],
        };
        let out = blend_morphs(&lhs, &rhs, 0.5);
        assert_eq!(out.weights, vec![0.5, 1.0, 0.25]);
    }

    #[test]
    fn test_blend_joints_weight_zero_is_lhs() {
        let lhs = JointFrame {
            rotations: vec![Quat::IDENTITY],
            root_translation: [0.0, 1.0, 0.0],
        };
        let rhs = JointFrame {
            rotations: vec![Quat::from_axis_angle([1.0, 0.0, 0.0], 1.0)],
            root_translation: [2.0, 1.0, 0.0],
        };
        let out = blend_joints(&lhs, &rhs, 0.0);
        assert_eq!(out, lhs);
        let out = blend_joints(&lhs, &rhs, 1.0);
        assert_eq!(out.root_translation, [2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sample_pose_falls_back_to_lhs() {
        let lhs = AnimationClip::from_frames(
            vec![JointFrame {
                rotations: vec![Quat::IDENTITY],
                root_translation: [0.0; 3],
            }],
            vec![MorphFrame {
                weights: vec![0.2],
            }],
        );
        let rhs = AnimationClip::default();
        let eval = Evaluation {
            joint_weight: 1.0,
            morph_weight: 1.0,
            ..Evaluation::default()
        };
        let pose = sample_pose(&lhs, &rhs, &eval);
        assert_eq!(pose.morphs.map(|m| m.weights), Some(vec![0.2]));
        assert!(pose.joints.is_some());
    }

    #[test]
    fn test_sample_pose_empty_lhs_is_none() {
        let pose = sample_pose(
            &AnimationClip::default(),
            &AnimationClip::default(),
            &Evaluation::default(),
        );
        assert_eq!(pose, BlendedPose::default());
    }
}

//! 带阻尼的 CCD 求解器（Cyclic Coordinate Descent）
//!
//! 从末端向根逐个关节旋转，每次只应用部分修正角度，
//! 多帧累积后才贴近目标，适合柔软的触手"伸手"动作。

use glam::{Quat, Vec3};

use crate::config::RigConfig;
use crate::skeleton::{BoneId, SceneGraph};
use crate::{Result, RigError};

use super::two_bone::check_link;
use super::{any_perpendicular, DEGENERATE_EPSILON};

/// 修正角度低于此值的关节跳过
const MIN_ANGLE: f32 = 0.01;

/// 带阻尼的 CCD 求解器
#[derive(Clone, Debug)]
pub struct CcdSolver {
    /// 关节（根到末端，不含 tip）
    joints: Vec<BoneId>,
    /// 末端效应器
    tip: BoneId,
    /// 每次修正应用的角度比例
    pub damping: f32,
    /// 向修正后旋转的插值系数
    pub slerp: f32,
    /// 每次 solve 的遍历次数
    pub passes: u32,
}

impl CcdSolver {
    /// 创建求解器
    ///
    /// `joints` 必须是连续的父→子链，`tip` 是最后一个关节的子骨骼。
    pub fn new<S: SceneGraph + ?Sized>(
        scene: &S,
        joints: Vec<BoneId>,
        tip: BoneId,
        config: &RigConfig,
    ) -> Result<Self> {
        config.validate()?;
        let Some(&last) = joints.last() else {
            return Err(RigError::ChainTooShort { required: 1, actual: 0 });
        };
        for pair in joints.windows(2) {
            check_link(scene, pair[0], pair[1])?;
        }
        check_link(scene, last, tip)?;

        log::debug!("[IK] CCD 链: {} 个关节，末端 #{}", joints.len(), tip.index());

        Ok(Self {
            joints,
            tip,
            damping: config.ccd_damping,
            slerp: config.ccd_slerp,
            passes: 1,
        })
    }

    /// 关节列表
    pub fn joints(&self) -> &[BoneId] {
        &self.joints
    }

    /// 末端骨骼
    pub fn tip(&self) -> BoneId {
        self.tip
    }

    /// 向目标修正一步，返回末端到目标的距离
    pub fn solve<S: SceneGraph + ?Sized>(&self, scene: &mut S, target: Vec3) -> f32 {
        for _ in 0..self.passes {
            for &joint in self.joints.iter().rev() {
                self.rotate_joint(scene, joint, target);
            }
        }

        scene
            .world_position(self.tip)
            .map_or(f32::MAX, |tip| tip.distance(target))
    }

    fn rotate_joint<S: SceneGraph + ?Sized>(&self, scene: &mut S, joint: BoneId, target: Vec3) {
        let (Some(joint_pos), Some(tip_pos), Some(local)) = (
            scene.world_position(joint),
            scene.world_position(self.tip),
            scene.local_rotation(joint),
        ) else {
            return;
        };

        let to_tip = tip_pos - joint_pos;
        let to_target = target - joint_pos;
        if to_tip.length_squared() < DEGENERATE_EPSILON || to_target.length_squared() < DEGENERATE_EPSILON {
            return;
        }
        let to_tip = to_tip.normalize();
        let to_target = to_target.normalize();

        let angle = to_tip.dot(to_target).clamp(-1.0, 1.0).acos();
        if angle < MIN_ANGLE {
            return;
        }
        // 反向共线时叉积为零，任取一条垂直轴
        let axis = to_tip.cross(to_target);
        let axis = if axis.length_squared() < DEGENERATE_EPSILON {
            any_perpendicular(to_tip)
        } else {
            axis.normalize()
        };

        // 世界空间的旋转轴换算到父骨骼空间
        let parent_world = scene.parent_world_rotation(joint);
        let local_axis = (parent_world.inverse() * axis).normalize();
        let corrected = Quat::from_axis_angle(local_axis, angle * self.damping) * local;

        scene.set_local_rotation(joint, local.slerp(corrected, self.slerp));
        scene.propagate(joint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::BoneSet;

    fn tentacle() -> (BoneSet, Vec<BoneId>, BoneId) {
        let mut set = BoneSet::new();
        let root = set.add_bone("c0", None, Vec3::ZERO, Quat::IDENTITY).unwrap();
        let a = set.add_bone("c1", Some(root), Vec3::new(0.0, 0.3, 0.0), Quat::IDENTITY).unwrap();
        let b = set.add_bone("c2", Some(a), Vec3::new(0.0, 0.3, 0.0), Quat::IDENTITY).unwrap();
        let tip = set.add_bone("c3", Some(b), Vec3::new(0.0, 0.3, 0.0), Quat::IDENTITY).unwrap();
        (set, vec![root, a, b], tip)
    }

    #[test]
    fn test_single_step_moves_toward_target() {
        let (mut set, joints, tip) = tentacle();
        let solver = CcdSolver::new(&set, joints, tip, &RigConfig::default()).unwrap();
        let target = Vec3::new(0.5, 0.5, 0.0);

        let before = set.world_position(tip).unwrap().distance(target);
        let after = solver.solve(&mut set, target);
        assert!(after < before);
        // 阻尼下单步不会直接到达
        assert!(after > 0.01);
    }

    #[test]
    fn test_converges_over_many_ticks() {
        let (mut set, joints, tip) = tentacle();
        let solver = CcdSolver::new(&set, joints, tip, &RigConfig::default()).unwrap();
        let target = Vec3::new(0.5, 0.5, 0.0);

        let mut distance = f32::MAX;
        for _ in 0..200 {
            distance = solver.solve(&mut set, target);
        }
        assert!(distance < 0.05, "distance = {}", distance);
    }

    #[test]
    fn test_target_at_tip_is_noop() {
        let (mut set, joints, tip) = tentacle();
        let solver = CcdSolver::new(&set, joints.clone(), tip, &RigConfig::default()).unwrap();
        let distance = solver.solve(&mut set, Vec3::new(0.0, 0.9, 0.0));
        assert!(distance < 1e-5);
        for joint in joints {
            assert!(set.local_rotation(joint).unwrap().abs_diff_eq(Quat::IDENTITY, 1e-6));
        }
    }

    #[test]
    fn test_target_on_joint_stays_finite() {
        let (mut set, joints, tip) = tentacle();
        let solver = CcdSolver::new(&set, joints, tip, &RigConfig::default()).unwrap();
        let distance = solver.solve(&mut set, Vec3::ZERO);
        assert!(distance.is_finite());
        assert!(set.world_position(tip).unwrap().is_finite());
    }

    /// 单关节：根在原点，末端在 +Y 一个单位处
    fn single_joint() -> (BoneSet, BoneId, BoneId) {
        let mut set = BoneSet::new();
        let root = set.add_bone("j0", None, Vec3::ZERO, Quat::IDENTITY).unwrap();
        let tip = set.add_bone("j1", Some(root), Vec3::Y, Quat::IDENTITY).unwrap();
        (set, root, tip)
    }

    #[test]
    fn test_small_angle_above_threshold_is_corrected() {
        let (mut set, root, tip) = single_joint();
        let solver = CcdSolver::new(&set, vec![root], tip, &RigConfig::default()).unwrap();
        let target = Vec3::new(-(0.02f32).sin(), (0.02f32).cos(), 0.0);

        let before = set.world_position(tip).unwrap().distance(target);
        let after = solver.solve(&mut set, target);
        assert!(after < before);
        assert!(!set.local_rotation(root).unwrap().abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_opposite_target_still_turns() {
        let (mut set, root, tip) = single_joint();
        let solver = CcdSolver::new(&set, vec![root], tip, &RigConfig::default()).unwrap();
        let after = solver.solve(&mut set, Vec3::NEG_Y);
        assert!(after.is_finite());
        assert!(after < 2.0 - 1e-3);
    }

    #[test]
    fn test_rejects_empty_and_broken() {
        let (set, joints, tip) = tentacle();
        let config = RigConfig::default();
        assert!(matches!(
            CcdSolver::new(&set, Vec::new(), tip, &config),
            Err(RigError::ChainTooShort { .. })
        ));
        assert!(matches!(
            CcdSolver::new(&set, vec![joints[0]], tip, &config),
            Err(RigError::BrokenChain { .. })
        ));
    }
}

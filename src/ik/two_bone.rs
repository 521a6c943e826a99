//! 双骨骼 IK - 余弦定理解析解
//!
//! 适用于 髋→膝→脚 / 肩→肘→手 这类两节链。
//! 极向量决定关节弯曲平面，消除二自由度解的左右歧义。

use std::f32::consts::PI;

use glam::Vec3;

use crate::config::RigConfig;
use crate::skeleton::{BoneId, SceneGraph};
use crate::{Result, RigError};

use super::{aim_rotation, any_perpendicular, safe_normalize, FORWARD};

/// 目标距离下限（防止余弦定理除零）
const MIN_REACH: f32 = 1e-4;

// ============================================================================
// 纯函数求解
// ============================================================================

/// 双骨骼求解结果（相对链根）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoBoneSolution {
    /// 根关节处的内角（瞄准方向与上骨骼的夹角）
    pub upper_angle: f32,
    /// 中间关节处的内角
    pub lower_angle: f32,
    /// 极向量相对目标的水平朝向角
    pub side_angle: f32,
    /// 根指向目标的单位方向
    pub aim: Vec3,
    /// 弯曲平面内垂直于 aim 的单位方向
    pub bend: Vec3,
    /// 中间关节位置
    pub joint_position: Vec3,
    /// 末端位置
    pub end_position: Vec3,
    /// 实际使用的根到末端距离
    pub reach: f32,
    /// 目标超出可达范围
    pub stretched: bool,
}

impl TwoBoneSolution {
    /// 中间关节的弯曲角（0 表示完全伸直）
    #[inline]
    pub fn knee_bend(&self) -> f32 {
        PI - self.lower_angle
    }
}

/// 求解双骨骼 IK
///
/// # 参数
/// - `upper_length` / `lower_length`: 两节骨骼长度
/// - `target`: 目标点（相对链根）
/// - `pole`: 极向量点（相对链根），弯曲平面会旋转到包含它
/// - `reach_clamp`: 最大伸展比例，距离被限制在 `reach_clamp * (L1 + L2)`
pub fn solve_two_bone(
    upper_length: f32,
    lower_length: f32,
    target: Vec3,
    pole: Vec3,
    reach_clamp: f32,
) -> TwoBoneSolution {
    let total = upper_length + lower_length;
    let max_reach = total * reach_clamp;
    let distance = target.length();

    // 目标长度为零时方向未定义，回退到默认前方
    let aim = safe_normalize(target, FORWARD);
    let reach = distance.min(max_reach).max(MIN_REACH);
    let stretched = distance > max_reach;

    let (l1, l2) = (upper_length, lower_length);

    let cos_upper = ((l1 * l1 + reach * reach - l2 * l2) / (2.0 * l1 * reach)).clamp(-1.0, 1.0);
    let upper_angle = cos_upper.acos();

    let cos_lower = ((l1 * l1 + l2 * l2 - reach * reach) / (2.0 * l1 * l2)).clamp(-1.0, 1.0);
    let lower_angle = cos_lower.acos();

    let bend = bend_direction(aim, pole);

    let joint_position = (aim * cos_upper + bend * upper_angle.sin()) * l1;
    let to_end = safe_normalize(aim * reach - joint_position, aim);
    let end_position = joint_position + to_end * l2;

    let pole_dir = pole - target;
    let side_angle = pole_dir.x.atan2(pole_dir.z);

    TwoBoneSolution {
        upper_angle,
        lower_angle,
        side_angle,
        aim,
        bend,
        joint_position,
        end_position,
        reach,
        stretched,
    }
}

/// 把极向量投影到垂直于 aim 的平面上
fn bend_direction(aim: Vec3, pole: Vec3) -> Vec3 {
    let projected = pole - aim * pole.dot(aim);
    safe_normalize(projected, any_perpendicular(aim))
}

// ============================================================================
// 绑定到骨骼的求解器
// ============================================================================

/// 双骨骼 IK 求解器（绑定到固定骨骼链）
#[derive(Clone, Debug)]
pub struct TwoBoneIk {
    /// 上骨骼（髋 / 肩）
    pub upper: BoneId,
    /// 下骨骼（膝 / 肘）
    pub lower: BoneId,
    /// 末端（脚 / 手）
    pub end: BoneId,
    /// 上骨骼长度
    pub upper_length: f32,
    /// 下骨骼长度
    pub lower_length: f32,
    /// 上骨骼本地空间中指向下骨骼的方向
    upper_axis: Vec3,
    /// 下骨骼本地空间中指向末端的方向
    lower_axis: Vec3,
    reach_clamp: f32,
}

impl TwoBoneIk {
    /// 创建求解器，骨骼长度从绑定姿势推导
    pub fn new<S: SceneGraph + ?Sized>(
        scene: &S,
        upper: BoneId,
        lower: BoneId,
        end: BoneId,
        config: &RigConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_link(scene, upper, lower)?;
        check_link(scene, lower, end)?;

        let lower_offset = scene.rest_position(lower).ok_or(RigError::UnknownBone(lower.index()))?;
        let end_offset = scene.rest_position(end).ok_or(RigError::UnknownBone(end.index()))?;

        let upper_length = lower_offset.length();
        let lower_length = end_offset.length();
        if upper_length < MIN_REACH {
            return Err(RigError::DegenerateSegment(upper.index()));
        }
        if lower_length < MIN_REACH {
            return Err(RigError::DegenerateSegment(lower.index()));
        }

        log::debug!(
            "[IK] 双骨骼链 #{} -> #{} -> #{}: L1={:.3}, L2={:.3}",
            upper.index(), lower.index(), end.index(), upper_length, lower_length
        );

        Ok(Self {
            upper,
            lower,
            end,
            upper_length,
            lower_length,
            upper_axis: lower_offset / upper_length,
            lower_axis: end_offset / lower_length,
            reach_clamp: config.two_bone_reach_clamp,
        })
    }

    /// 创建求解器，骨骼长度由宿主指定
    ///
    /// 长度为 `None` 时使用配置中的默认长度。
    pub fn with_lengths<S: SceneGraph + ?Sized>(
        scene: &S,
        upper: BoneId,
        lower: BoneId,
        end: BoneId,
        upper_length: Option<f32>,
        lower_length: Option<f32>,
        config: &RigConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_link(scene, upper, lower)?;
        check_link(scene, lower, end)?;

        let upper_length = upper_length.unwrap_or(config.default_upper_length);
        let lower_length = lower_length.unwrap_or(config.default_lower_length);
        if !(upper_length > 0.0 && lower_length > 0.0) {
            return Err(RigError::InvalidConfig("two-bone lengths must be positive".into()));
        }

        let upper_axis = safe_normalize(scene.rest_position(lower).unwrap_or(Vec3::ZERO), Vec3::NEG_Y);
        let lower_axis = safe_normalize(scene.rest_position(end).unwrap_or(Vec3::ZERO), Vec3::NEG_Y);

        Ok(Self {
            upper,
            lower,
            end,
            upper_length,
            lower_length,
            upper_axis,
            lower_axis,
            reach_clamp: config.two_bone_reach_clamp,
        })
    }

    /// 总长度
    #[inline]
    pub fn total_length(&self) -> f32 {
        self.upper_length + self.lower_length
    }

    /// 求解并写入骨骼本地旋转
    ///
    /// `target` 与 `pole` 为世界坐标。`pole` 为 `None` 时沿用当前弯曲平面。
    /// 骨骼已不存在时返回 `None`。
    pub fn solve<S: SceneGraph + ?Sized>(
        &self,
        scene: &mut S,
        target: Vec3,
        pole: Option<Vec3>,
    ) -> Option<TwoBoneSolution> {
        let root = scene.world_position(self.upper)?;
        let pole_rel = match pole {
            Some(p) => p - root,
            None => scene.world_position(self.lower)? - root,
        };

        let solution = solve_two_bone(
            self.upper_length,
            self.lower_length,
            target - root,
            pole_rel,
            self.reach_clamp,
        );

        let parent_rot = scene.parent_world_rotation(self.upper);
        let upper_rest = scene.rest_rotation(self.upper)?;
        let lower_rest = scene.rest_rotation(self.lower)?;

        let upper_world = aim_rotation(
            parent_rot * upper_rest,
            self.upper_axis,
            solution.joint_position,
        );
        let lower_world = aim_rotation(
            upper_world * lower_rest,
            self.lower_axis,
            solution.end_position - solution.joint_position,
        );

        scene.set_local_rotation(self.upper, parent_rot.inverse() * upper_world);
        scene.set_local_rotation(self.lower, upper_world.inverse() * lower_world);
        scene.propagate(self.upper);

        if solution.stretched {
            log::trace!(
                "[IK] 目标超出可达范围 ({:.3} > {:.3})，完全伸展",
                (target - root).length(),
                self.total_length()
            );
        }

        Some(solution)
    }
}

/// 校验 child 的父骨骼是 parent
pub(crate) fn check_link<S: SceneGraph + ?Sized>(scene: &S, parent: BoneId, child: BoneId) -> Result<()> {
    for bone in [parent, child] {
        if bone.index() >= scene.bone_count() {
            return Err(RigError::UnknownBone(bone.index()));
        }
    }
    if scene.parent(child) != Some(parent) {
        return Err(RigError::BrokenChain {
            parent: parent.index(),
            child: child.index(),
        });
    }
    Ok(())
}

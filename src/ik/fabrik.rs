//! FABRIK 链 IK（Forward And Backward Reaching Inverse Kinematics）
//!
//! 设计原则：
//! - 位置空间迭代，段长严格保持
//! - 目标不可达时跳过迭代，直接沿根→目标射线排布
//! - 求解后把关节位置转换回骨骼本地旋转（宿主以旋转存储姿势）

use glam::{Quat, Vec3};

use crate::config::RigConfig;
use crate::skeleton::{BoneId, SceneGraph};
use crate::{Result, RigError};

use super::two_bone::check_link;
use super::{aim_rotation, safe_normalize, DEGENERATE_EPSILON, FORWARD};

/// 段长下限
const MIN_SEGMENT: f32 = 1e-5;

// ============================================================================
// 纯函数求解
// ============================================================================

/// FABRIK 求解结果
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FabrikOutcome {
    /// 实际迭代次数（不可达时为 0）
    pub iterations: u32,
    /// 末端到目标的最终距离
    pub distance: f32,
    /// 是否在收敛阈值内
    pub reached: bool,
    /// 是否走了不可达分支
    pub stretched: bool,
}

/// 在关节位置上执行 FABRIK
///
/// # 参数
/// - `positions`: 关节世界位置（根到末端），`positions[0]` 为固定锚点
/// - `lengths`: 段长，`lengths.len() == positions.len() - 1`
/// - `target`: 目标点
/// - `iterations`: 迭代上限
/// - `threshold`: 收敛阈值
/// - `pole`: 可选极向量点，每次后向传递后把中间关节转向它
pub fn fabrik_solve(
    positions: &mut [Vec3],
    lengths: &[f32],
    target: Vec3,
    iterations: u32,
    threshold: f32,
    pole: Option<Vec3>,
) -> FabrikOutcome {
    let n = positions.len();
    if n < 2 || lengths.len() + 1 != n {
        return FabrikOutcome {
            distance: positions.last().map_or(f32::MAX, |p| p.distance(target)),
            ..Default::default()
        };
    }

    let anchor = positions[0];
    let total_length: f32 = lengths.iter().sum();

    // 不可达：沿射线完全伸展
    if anchor.distance(target) >= total_length {
        let direction = safe_normalize(target - anchor, FORWARD);
        for i in 1..n {
            positions[i] = positions[i - 1] + direction * lengths[i - 1];
        }
        let distance = positions[n - 1].distance(target);
        return FabrikOutcome {
            iterations: 0,
            distance,
            reached: distance < threshold,
            stretched: true,
        };
    }

    let mut distance = positions[n - 1].distance(target);
    let mut used = 0;

    while used < iterations && distance >= threshold {
        // 前向传递：末端放到目标，向根方向逐个放置
        positions[n - 1] = target;
        for i in (0..n - 1).rev() {
            let direction = safe_normalize(positions[i] - positions[i + 1], FORWARD);
            positions[i] = positions[i + 1] + direction * lengths[i];
        }

        // 后向传递：根复位到锚点，向末端逐个放置
        positions[0] = anchor;
        for i in 0..n - 1 {
            let direction = safe_normalize(positions[i + 1] - positions[i], FORWARD);
            positions[i + 1] = positions[i] + direction * lengths[i];
        }

        if let Some(pole) = pole {
            for i in 1..n - 1 {
                apply_pole(positions, i, pole);
            }
        }

        used += 1;
        distance = positions[n - 1].distance(target);
    }

    FabrikOutcome {
        iterations: used,
        distance,
        reached: distance < threshold,
        stretched: false,
    }
}

/// 绕相邻两关节连线旋转中间关节，使其朝向极向量
///
/// 旋转轴经过 i-1 与 i+1，因此两侧段长都不变。
fn apply_pole(positions: &mut [Vec3], i: usize, pole: Vec3) {
    let prev = positions[i - 1];
    let axis = positions[i + 1] - prev;
    if axis.length_squared() < DEGENERATE_EPSILON {
        return;
    }
    let axis = axis.normalize();

    let offset = positions[i] - prev;
    let joint_perp = offset - axis * offset.dot(axis);
    let pole_rel = pole - prev;
    let pole_perp = pole_rel - axis * pole_rel.dot(axis);
    if joint_perp.length_squared() < DEGENERATE_EPSILON || pole_perp.length_squared() < DEGENERATE_EPSILON {
        return;
    }

    let from = joint_perp.normalize();
    let to = pole_perp.normalize();
    let angle = axis.dot(from.cross(to)).atan2(from.dot(to));
    positions[i] = prev + Quat::from_axis_angle(axis, angle) * offset;
}

// ============================================================================
// 绑定到骨骼的 FABRIK 链
// ============================================================================

/// FABRIK 骨骼链
///
/// 段长在构建时从绑定姿势缓存，之后不再改变（刚性骨骼长度）。
#[derive(Clone, Debug)]
pub struct FabrikChain {
    bones: Vec<BoneId>,
    segment_lengths: Vec<f32>,
    /// 每根骨骼本地空间中指向下一关节的方向
    rest_axes: Vec<Vec3>,
    total_length: f32,
    /// 迭代上限
    pub iterations: u32,
    /// 收敛阈值
    pub threshold: f32,
    /// 关节位置缓冲区（复用内存）
    positions: Vec<Vec3>,
}

impl FabrikChain {
    /// 从连续的父→子骨骼列表创建
    pub fn new<S: SceneGraph + ?Sized>(scene: &S, bones: Vec<BoneId>, config: &RigConfig) -> Result<Self> {
        config.validate()?;
        if bones.len() < 2 {
            return Err(RigError::ChainTooShort {
                required: 2,
                actual: bones.len(),
            });
        }

        let mut segment_lengths = Vec::with_capacity(bones.len() - 1);
        let mut rest_axes = Vec::with_capacity(bones.len() - 1);
        for pair in bones.windows(2) {
            check_link(scene, pair[0], pair[1])?;
            let offset = scene
                .rest_position(pair[1])
                .ok_or(RigError::UnknownBone(pair[1].index()))?;
            let length = offset.length();
            if length < MIN_SEGMENT {
                return Err(RigError::DegenerateSegment(pair[0].index()));
            }
            segment_lengths.push(length);
            rest_axes.push(offset / length);
        }

        let total_length = segment_lengths.iter().sum();
        log::debug!(
            "[FABRIK] 链 #{} 共 {} 节，总长 {:.3}",
            bones[0].index(),
            segment_lengths.len(),
            total_length
        );

        Ok(Self {
            positions: Vec::with_capacity(bones.len()),
            bones,
            segment_lengths,
            rest_axes,
            total_length,
            iterations: config.ik_iterations,
            threshold: config.ik_threshold,
        })
    }

    /// 从末端骨骼向上回溯 `count` 根骨骼创建
    pub fn from_end_bone<S: SceneGraph + ?Sized>(
        scene: &S,
        end: BoneId,
        count: usize,
        config: &RigConfig,
    ) -> Result<Self> {
        if end.index() >= scene.bone_count() {
            return Err(RigError::UnknownBone(end.index()));
        }
        let mut bones = Vec::with_capacity(count);
        let mut current = Some(end);
        while let Some(bone) = current {
            bones.push(bone);
            if bones.len() >= count {
                break;
            }
            current = scene.parent(bone);
        }
        bones.reverse();
        Self::new(scene, bones, config)
    }

    /// 链上骨骼（根到末端）
    pub fn bones(&self) -> &[BoneId] {
        &self.bones
    }

    /// 段长
    pub fn segment_lengths(&self) -> &[f32] {
        &self.segment_lengths
    }

    /// 总长
    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    /// 末端骨骼
    pub fn tip(&self) -> BoneId {
        self.bones[self.bones.len() - 1]
    }

    /// 求解并写入骨骼本地旋转
    ///
    /// 以当前姿势为初值；`pole` 为世界坐标的极向量点。
    pub fn solve<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        target: Vec3,
        pole: Option<Vec3>,
    ) -> FabrikOutcome {
        self.positions.clear();
        for &bone in &self.bones {
            match scene.world_position(bone) {
                Some(p) => self.positions.push(p),
                None => {
                    log::warn!("[FABRIK] 骨骼 #{} 不存在，跳过求解", bone.index());
                    return FabrikOutcome {
                        distance: f32::MAX,
                        ..Default::default()
                    };
                }
            }
        }

        let outcome = fabrik_solve(
            &mut self.positions,
            &self.segment_lengths,
            target,
            self.iterations,
            self.threshold,
            pole,
        );

        self.apply_rotations(scene);

        log::trace!(
            "[FABRIK] 迭代 {} 次，末端距离 {:.4}{}",
            outcome.iterations,
            outcome.distance,
            if outcome.stretched { "（不可达，完全伸展）" } else { "" }
        );

        outcome
    }

    /// 关节位置 → 本地旋转
    ///
    /// 每根骨骼在其父骨骼新朝向下的绑定姿势基础上，做无扭转的最小旋转，
    /// 把静止轴对齐到指向下一关节的方向。
    fn apply_rotations<S: SceneGraph + ?Sized>(&self, scene: &mut S) {
        let mut parent_world = scene.parent_world_rotation(self.bones[0]);

        for i in 0..self.segment_lengths.len() {
            let bone = self.bones[i];
            let rest = scene.rest_rotation(bone).unwrap_or(Quat::IDENTITY);
            let rest_world = parent_world * rest;
            let direction = self.positions[i + 1] - self.positions[i];
            let world = aim_rotation(rest_world, self.rest_axes[i], direction);

            scene.set_local_rotation(bone, parent_world.inverse() * world);
            parent_world = world;
        }

        scene.propagate(self.bones[0]);
    }
}

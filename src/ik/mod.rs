//! IK 求解器
//!
//! - TwoBoneIk: 余弦定理解析解（腿 / 手臂）
//! - FabrikChain: 任意长度链的 FABRIK 迭代解（触手 / 脖子）
//! - CcdSolver: 带阻尼的 CCD（柔软的触手伸展）

mod ccd;
mod fabrik;
mod two_bone;

pub use ccd::CcdSolver;
pub use fabrik::{fabrik_solve, FabrikChain, FabrikOutcome};
pub use two_bone::{solve_two_bone, TwoBoneIk, TwoBoneSolution};

use glam::{Quat, Vec3};

/// 退化方向的默认朝向
pub const FORWARD: Vec3 = Vec3::Z;

/// 向量长度平方低于此值视为零向量
pub(crate) const DEGENERATE_EPSILON: f32 = 1e-10;

/// 归一化，零向量时返回 `fallback`
///
/// 所有旋转计算都必须经过这里，避免 NaN 沿骨骼链扩散。
#[inline]
pub fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq < DEGENERATE_EPSILON || !len_sq.is_finite() {
        fallback
    } else {
        v / len_sq.sqrt()
    }
}

/// 任意一个与 `v` 垂直的单位向量
#[inline]
pub(crate) fn any_perpendicular(v: Vec3) -> Vec3 {
    // 选择与 v 最不平行的坐标轴
    let axis = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    safe_normalize(v.cross(axis), Vec3::Y)
}

/// 无扭转地把骨骼的静止轴对齐到新方向
///
/// `rest_world` 是骨骼在绑定姿势下的世界旋转，`rest_axis` 是骨骼本地空间中
/// 指向子骨骼的方向。结果是在 `rest_world` 基础上的最小旋转。
#[inline]
pub(crate) fn aim_rotation(rest_world: Quat, rest_axis: Vec3, direction: Vec3) -> Quat {
    let from = safe_normalize(rest_world * rest_axis, FORWARD);
    let to = safe_normalize(direction, from);
    (Quat::from_rotation_arc(from, to) * rest_world).normalize()
}

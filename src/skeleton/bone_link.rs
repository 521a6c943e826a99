//! 骨骼节点
//!
//! BoneLink 是骨骼竞技场中的单个节点，只记录父骨骼索引，
//! 不持有任何其他骨骼的引用。

use glam::{Mat4, Quat, Vec3};
use bitflags::bitflags;

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// 可旋转
        const ROTATABLE = 1 << 0;
        /// 可移动
        const MOVABLE = 1 << 1;
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 骨骼节点
///
/// - 静态数据：名称、父骨骼、绑定姿势（初始化后不变）
/// - 动态数据：每帧写入的本地变换
/// - 变换计算：local_to_world = parent.local_to_world * local_to_parent
#[derive(Clone, Debug)]
pub struct BoneLink {
    // ========================================
    // 静态数据（初始化后不变）
    // ========================================

    /// 骨骼名称
    pub name: String,

    /// 父骨骼索引 (-1 表示根骨骼)
    pub parent_index: i32,

    /// 骨骼标志
    pub flags: BoneFlags,

    /// 绑定姿势位置（相对父骨骼）
    pub rest_position: Vec3,

    /// 绑定姿势旋转（相对父骨骼）
    pub rest_rotation: Quat,

    // ========================================
    // 动态数据（每帧更新）
    // ========================================

    /// 本地位置
    pub local_position: Vec3,

    /// 本地旋转
    pub local_rotation: Quat,

    /// 本地变换矩阵 (local_to_parent)
    pub local_to_parent: Mat4,

    /// 全局变换矩阵 (local_to_world)
    pub local_to_world: Mat4,

    /// 是否为叶节点
    pub(crate) is_leaf: bool,
}

impl BoneLink {
    /// 创建新骨骼
    pub fn new(name: String) -> Self {
        Self {
            name,
            parent_index: -1,
            flags: BoneFlags::ROTATABLE | BoneFlags::MOVABLE,
            rest_position: Vec3::ZERO,
            rest_rotation: Quat::IDENTITY,
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            local_to_parent: Mat4::IDENTITY,
            local_to_world: Mat4::IDENTITY,
            is_leaf: true,
        }
    }

    /// 以绑定姿势创建骨骼
    pub fn with_rest_pose(name: String, position: Vec3, rotation: Quat) -> Self {
        let mut bone = Self::new(name);
        bone.rest_position = position;
        bone.rest_rotation = rotation.normalize();
        bone.local_position = position;
        bone.local_rotation = bone.rest_rotation;
        bone.compute_local_transform();
        bone
    }

    // ========================================
    // 访问器
    // ========================================

    /// 父骨骼索引
    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        if self.parent_index >= 0 {
            Some(self.parent_index as usize)
        } else {
            None
        }
    }

    /// 是否为根骨骼
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }

    /// 是否为叶节点
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// 获取世界位置
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.local_to_world.col(3).truncate()
    }

    /// 获取世界旋转
    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_mat4(&self.local_to_world).normalize()
    }

    // ========================================
    // 变换计算
    // ========================================

    /// 恢复绑定姿势
    #[inline]
    pub fn reset_pose(&mut self) {
        self.local_position = self.rest_position;
        self.local_rotation = self.rest_rotation;
        self.compute_local_transform();
    }

    /// 计算本地变换 (local_to_parent)
    pub fn compute_local_transform(&mut self) {
        self.local_to_parent = Mat4::from_rotation_translation(self.local_rotation, self.local_position);
    }

    /// 由父骨骼世界变换更新全局变换
    #[inline]
    pub(crate) fn update_global(&mut self, parent_to_world: Mat4) {
        self.local_to_world = parent_to_world * self.local_to_parent;
    }

    // ========================================
    // 标志检查方法
    // ========================================

    #[inline]
    pub fn is_rotatable(&self) -> bool {
        self.flags.contains(BoneFlags::ROTATABLE)
    }

    #[inline]
    pub fn is_movable(&self) -> bool {
        self.flags.contains(BoneFlags::MOVABLE)
    }
}

impl Default for BoneLink {
    fn default() -> Self {
        Self::new(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_pose_matrix() {
        let bone = BoneLink::with_rest_pose("hip".into(), Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY);
        let t = bone.local_to_parent.col(3).truncate();
        assert!((t - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);
        assert!(bone.is_root());
        assert!(bone.is_rotatable() && bone.is_movable());
    }

    #[test]
    fn test_reset_pose() {
        let mut bone = BoneLink::with_rest_pose("knee".into(), Vec3::Y, Quat::IDENTITY);
        bone.local_rotation = Quat::from_rotation_x(1.0);
        bone.local_position = Vec3::ZERO;
        bone.reset_pose();
        assert!(bone.local_rotation.abs_diff_eq(Quat::IDENTITY, 1e-6));
        assert!((bone.local_position - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_flags() {
        let mut bone = BoneLink::new("jaw".into());
        bone.flags.remove(BoneFlags::MOVABLE);
        assert!(bone.is_rotatable());
        assert!(!bone.is_movable());
    }
}

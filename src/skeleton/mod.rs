//! 骨骼系统 - 场景图适配层
//!
//! 核心设计思想：
//! - BoneLink: 单个骨骼节点，只保存父骨骼索引
//! - BoneSet: 骨骼竞技场，管理层次结构（参考实现）
//! - SceneGraph: 宿主场景图接口，IK / 动画只依赖它

mod bone_link;
mod bone_set;
mod scene_graph;

pub use bone_link::{BoneFlags, BoneLink};
pub use bone_set::BoneSet;
pub use scene_graph::SceneGraph;

use glam::{Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 骨骼句柄（骨骼竞技场中的索引）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(pub usize);

impl BoneId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// 骨骼变换数据
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl BoneTransform {
    /// 读取骨骼当前本地变换
    pub fn from_scene<S: SceneGraph + ?Sized>(scene: &S, bone: BoneId) -> Option<Self> {
        Some(Self {
            translation: scene.local_position(bone)?,
            rotation: scene.local_rotation(bone)?,
            scale: Vec3::ONE,
        })
    }

    /// 写回骨骼本地变换
    pub fn apply_to<S: SceneGraph + ?Sized>(&self, scene: &mut S, bone: BoneId) {
        scene.set_local_position(bone, self.translation);
        scene.set_local_rotation(bone, self.rotation);
    }
}

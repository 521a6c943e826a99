//! 场景图适配接口
//!
//! IK 和程序化动画只通过这个 trait 访问宿主的骨骼节点，
//! 不假设任何具体 3D 引擎的对象模型。

use glam::{Quat, Vec3};

use super::BoneId;

/// 宿主场景图
///
/// 查询接口对不存在的骨骼返回 `None`；写入接口对不存在的骨骼静默忽略。
/// 写入本地变换后需要调用 [`SceneGraph::propagate`] 才能读到新的世界变换。
pub trait SceneGraph {
    /// 骨骼数量
    fn bone_count(&self) -> usize;

    /// 按名称查找骨骼
    fn find_bone(&self, name: &str) -> Option<BoneId>;

    /// 父骨骼
    fn parent(&self, bone: BoneId) -> Option<BoneId>;

    /// 世界位置
    fn world_position(&self, bone: BoneId) -> Option<Vec3>;

    /// 世界旋转
    fn world_rotation(&self, bone: BoneId) -> Option<Quat>;

    /// 本地位置（相对父骨骼）
    fn local_position(&self, bone: BoneId) -> Option<Vec3>;

    /// 本地旋转（相对父骨骼）
    fn local_rotation(&self, bone: BoneId) -> Option<Quat>;

    /// 绑定姿势位置
    fn rest_position(&self, bone: BoneId) -> Option<Vec3>;

    /// 绑定姿势旋转
    fn rest_rotation(&self, bone: BoneId) -> Option<Quat>;

    /// 写入本地位置
    fn set_local_position(&mut self, bone: BoneId, position: Vec3);

    /// 写入本地旋转
    fn set_local_rotation(&mut self, bone: BoneId, rotation: Quat);

    /// 刷新以 `bone` 为根的子树的世界变换
    fn propagate(&mut self, bone: BoneId);

    /// 刷新全部世界变换
    fn update_world_transforms(&mut self);

    /// 父骨骼的世界旋转（根骨骼为单位旋转）
    fn parent_world_rotation(&self, bone: BoneId) -> Quat {
        self.parent(bone)
            .and_then(|p| self.world_rotation(p))
            .unwrap_or(Quat::IDENTITY)
    }
}

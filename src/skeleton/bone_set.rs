//! 骨骼集合 - 场景图的竞技场实现
//!
//! 骨骼按根优先的顺序添加，父骨骼索引必须已经存在，
//! 因此每个非根骨骼恰好有一个父骨骼且不会出现环。

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use crate::{Result, RigError};

use super::bone_link::{BoneFlags, BoneLink};
use super::scene_graph::SceneGraph;
use super::BoneId;

/// 骨骼集合
#[derive(Clone, Debug, Default)]
pub struct BoneSet {
    bones: Vec<BoneLink>,
    name_to_index: HashMap<String, usize>,
    /// 子骨骼缓存
    children_cache: Vec<Vec<usize>>,
}

impl BoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加骨骼（绑定姿势即初始姿势）
    pub fn add_bone(
        &mut self,
        name: &str,
        parent: Option<BoneId>,
        position: Vec3,
        rotation: Quat,
    ) -> Result<BoneId> {
        if self.name_to_index.contains_key(name) {
            return Err(RigError::DuplicateBoneName(name.to_string()));
        }

        let index = self.bones.len();
        let mut bone = BoneLink::with_rest_pose(name.to_string(), position, rotation);

        let parent_world = match parent {
            Some(p) => {
                if p.index() >= index {
                    return Err(RigError::InvalidParent {
                        bone: name.to_string(),
                        parent: p.index(),
                    });
                }
                bone.parent_index = p.index() as i32;
                self.bones[p.index()].is_leaf = false;
                self.children_cache[p.index()].push(index);
                self.bones[p.index()].local_to_world
            }
            None => Mat4::IDENTITY,
        };
        bone.update_global(parent_world);

        log::trace!("[Skeleton] 添加骨骼 '{}' -> #{} (父: {:?})", name, index, parent);

        self.name_to_index.insert(name.to_string(), index);
        self.bones.push(bone);
        self.children_cache.push(Vec::new());
        Ok(BoneId(index))
    }

    /// 骨骼数量
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// 获取骨骼
    pub fn get_bone(&self, bone: BoneId) -> Option<&BoneLink> {
        self.bones.get(bone.index())
    }

    /// 通过名称查找骨骼
    pub fn find_bone_by_name(&self, name: &str) -> Option<BoneId> {
        self.name_to_index.get(name).copied().map(BoneId)
    }

    /// 子骨骼列表
    pub fn children(&self, bone: BoneId) -> &[usize] {
        self.children_cache
            .get(bone.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 骨骼名称迭代器
    pub fn bone_names(&self) -> impl Iterator<Item = &str> {
        self.bones.iter().map(|b| b.name.as_str())
    }

    /// 设置骨骼标志
    pub fn set_flags(&mut self, bone: BoneId, flags: BoneFlags) {
        if let Some(b) = self.bones.get_mut(bone.index()) {
            b.flags = flags;
        }
    }

    /// 全部骨骼恢复绑定姿势
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.reset_pose();
        }
        self.update_world_transforms();
    }

    /// 蒙皮用世界矩阵列表
    pub fn world_matrices(&self) -> Vec<Mat4> {
        self.bones.iter().map(|b| b.local_to_world).collect()
    }

    /// 递归更新全局变换
    fn update_global_transform_recursive(&mut self, idx: usize) {
        if idx >= self.bones.len() {
            return;
        }

        let parent_world = match self.bones[idx].parent_id() {
            Some(p) if p < self.bones.len() => self.bones[p].local_to_world,
            _ => Mat4::IDENTITY,
        };
        self.bones[idx].update_global(parent_world);

        // 递归更新子骨骼
        for i in 0..self.children_cache[idx].len() {
            let child = self.children_cache[idx][i];
            self.update_global_transform_recursive(child);
        }
    }
}

impl SceneGraph for BoneSet {
    fn bone_count(&self) -> usize {
        self.bones.len()
    }

    fn find_bone(&self, name: &str) -> Option<BoneId> {
        self.find_bone_by_name(name)
    }

    fn parent(&self, bone: BoneId) -> Option<BoneId> {
        self.bones.get(bone.index())?.parent_id().map(BoneId)
    }

    fn world_position(&self, bone: BoneId) -> Option<Vec3> {
        self.bones.get(bone.index()).map(BoneLink::position)
    }

    fn world_rotation(&self, bone: BoneId) -> Option<Quat> {
        self.bones.get(bone.index()).map(BoneLink::rotation)
    }

    fn local_position(&self, bone: BoneId) -> Option<Vec3> {
        self.bones.get(bone.index()).map(|b| b.local_position)
    }

    fn local_rotation(&self, bone: BoneId) -> Option<Quat> {
        self.bones.get(bone.index()).map(|b| b.local_rotation)
    }

    fn rest_position(&self, bone: BoneId) -> Option<Vec3> {
        self.bones.get(bone.index()).map(|b| b.rest_position)
    }

    fn rest_rotation(&self, bone: BoneId) -> Option<Quat> {
        self.bones.get(bone.index()).map(|b| b.rest_rotation)
    }

    fn set_local_position(&mut self, bone: BoneId, position: Vec3) {
        if let Some(b) = self.bones.get_mut(bone.index()) {
            if b.is_movable() {
                b.local_position = position;
                b.compute_local_transform();
            }
        }
    }

    fn set_local_rotation(&mut self, bone: BoneId, rotation: Quat) {
        if let Some(b) = self.bones.get_mut(bone.index()) {
            if b.is_rotatable() {
                b.local_rotation = rotation.normalize();
                b.compute_local_transform();
            }
        }
    }

    fn propagate(&mut self, bone: BoneId) {
        self.update_global_transform_recursive(bone.index());
    }

    fn update_world_transforms(&mut self) {
        // 父骨骼索引总小于子骨骼，顺序遍历即可
        for idx in 0..self.bones.len() {
            let parent_world = match self.bones[idx].parent_id() {
                Some(p) => self.bones[p].local_to_world,
                None => Mat4::IDENTITY,
            };
            self.bones[idx].update_global(parent_world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg() -> (BoneSet, BoneId, BoneId, BoneId) {
        let mut set = BoneSet::new();
        let hip = set.add_bone("hip", None, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY).unwrap();
        let knee = set.add_bone("knee", Some(hip), Vec3::new(0.0, -0.5, 0.0), Quat::IDENTITY).unwrap();
        let foot = set.add_bone("foot", Some(knee), Vec3::new(0.0, -0.5, 0.0), Quat::IDENTITY).unwrap();
        (set, hip, knee, foot)
    }

    #[test]
    fn test_world_positions_from_bind_pose() {
        let (set, _, knee, foot) = leg();
        assert!((set.world_position(knee).unwrap() - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-6);
        assert!((set.world_position(foot).unwrap() - Vec3::ZERO).length() < 1e-6);
    }

    #[test]
    fn test_rejects_forward_parent() {
        let mut set = BoneSet::new();
        let err = set.add_bone("orphan", Some(BoneId(3)), Vec3::ZERO, Quat::IDENTITY);
        assert!(matches!(err, Err(RigError::InvalidParent { .. })));
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let (mut set, hip, _, _) = leg();
        let err = set.add_bone("knee", Some(hip), Vec3::ZERO, Quat::IDENTITY);
        assert!(matches!(err, Err(RigError::DuplicateBoneName(_))));
    }

    #[test]
    fn test_propagate_rotation() {
        let (mut set, hip, _, foot) = leg();
        set.set_local_rotation(hip, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        set.propagate(hip);
        // 腿向 -Y 伸出，绕 Z 旋转 90° 后指向 +X
        let p = set.world_position(foot).unwrap();
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_locked_bone_ignores_writes() {
        let (mut set, hip, _, _) = leg();
        set.set_flags(hip, BoneFlags::empty());
        set.set_local_rotation(hip, Quat::from_rotation_x(1.0));
        assert!(set.local_rotation(hip).unwrap().abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_reset_pose() {
        let (mut set, hip, _, foot) = leg();
        set.set_local_rotation(hip, Quat::from_rotation_x(0.7));
        set.propagate(hip);
        set.reset_pose();
        assert!((set.world_position(foot).unwrap() - Vec3::ZERO).length() < 1e-6);
    }

    #[test]
    fn test_children_cache() {
        let (set, hip, knee, foot) = leg();
        assert_eq!(set.children(hip), &[knee.index()]);
        assert!(set.get_bone(foot).unwrap().is_leaf());
        assert!(!set.get_bone(hip).unwrap().is_leaf());
    }
}

//! 混合树
//!
//! 叶节点提供值（常量或按时间采样），内部节点做叠加 / 方向选择，
//! 自底向上求值得到一个标量或姿势。

mod tree;

pub use tree::{selected_index, BlendNode, BlendTree, DirectionalMode, LeafSource};

use glam::{Quat, Vec3};

use crate::skeleton::{BoneId, BoneTransform, SceneGraph};

/// 可混合的值
pub trait Blendable: Clone {
    /// 空树的求值结果，也是叠加的单位元
    fn neutral() -> Self;

    /// `self + other * weight`
    fn add_weighted(&self, other: &Self, weight: f32) -> Self;

    /// 线性插值
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

impl Blendable for f32 {
    fn neutral() -> Self {
        0.0
    }

    fn add_weighted(&self, other: &Self, weight: f32) -> Self {
        self + other * weight
    }

    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Blendable for Vec3 {
    fn neutral() -> Self {
        Vec3::ZERO
    }

    fn add_weighted(&self, other: &Self, weight: f32) -> Self {
        *self + *other * weight
    }

    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec3::lerp(*self, *other, t)
    }
}

// ============================================================================
// 姿势
// ============================================================================

/// 骨骼本地变换列表，下标即骨骼索引
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub transforms: Vec<BoneTransform>,
}

impl Pose {
    pub fn new(transforms: Vec<BoneTransform>) -> Self {
        Self { transforms }
    }

    /// 读取场景图当前的本地姿势
    pub fn capture<S: SceneGraph + ?Sized>(scene: &S) -> Self {
        let transforms = (0..scene.bone_count())
            .map(|i| BoneTransform::from_scene(scene, BoneId(i)).unwrap_or_default())
            .collect();
        Self { transforms }
    }

    /// 写回场景图并刷新世界变换
    pub fn apply_to<S: SceneGraph + ?Sized>(&self, scene: &mut S) {
        for (i, transform) in self.transforms.iter().enumerate().take(scene.bone_count()) {
            transform.apply_to(scene, BoneId(i));
        }
        scene.update_world_transforms();
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// 逐骨骼合并，较短一侧缺失的骨骼按单位变换处理
    fn zip_with(&self, other: &Self, f: impl Fn(&BoneTransform, &BoneTransform) -> BoneTransform) -> Self {
        let identity = BoneTransform::default();
        let len = self.transforms.len().max(other.transforms.len());
        let transforms = (0..len)
            .map(|i| {
                let a = self.transforms.get(i).unwrap_or(&identity);
                let b = other.transforms.get(i).unwrap_or(&identity);
                f(a, b)
            })
            .collect();
        Self { transforms }
    }
}

impl Blendable for Pose {
    fn neutral() -> Self {
        Self::default()
    }

    /// 叠加姿势：位移相加，旋转右乘 slerp(I, b, w)，缩放按比例
    fn add_weighted(&self, other: &Self, weight: f32) -> Self {
        self.zip_with(other, |a, b| BoneTransform {
            translation: a.translation + b.translation * weight,
            rotation: (a.rotation * Quat::IDENTITY.slerp(b.rotation, weight)).normalize(),
            scale: a.scale * Vec3::ONE.lerp(b.scale, weight),
        })
    }

    fn lerp(&self, other: &Self, t: f32) -> Self {
        self.zip_with(other, |a, b| BoneTransform {
            translation: a.translation.lerp(b.translation, t),
            rotation: a.rotation.slerp(b.rotation, t).normalize(),
            scale: a.scale.lerp(b.scale, t),
        })
    }
}

//! 程序化动画
//!
//! 没有动画片段的生物用振荡器驱动骨骼：
//! - ProceduralAnimator: 待机 / 行走 / 攻击 / 受击
//! - SwimAnimator: 鳍拍动 + 尾巴 / 触手波动 + 身体摆动
//! - TentacleController: 有目标时 CCD 伸展，无目标时正弦波动

mod procedural;
mod swim;

pub use procedural::{LimbOffset, ProceduralAnimator};
pub use swim::{FinFlapper, FinSide, SwimAnimator, TentacleController, TentacleWave};

use std::collections::HashMap;

use glam::{EulerRot, Quat, Vec3};
use once_cell::sync::Lazy;

use crate::skeleton::{BoneId, BoneSet, SceneGraph};

// ============================================================================
// 肢体通道
// ============================================================================

/// 程序化动画驱动的肢体通道
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimbChannel {
    Body,
    Head,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

impl LimbChannel {
    /// 全部通道
    pub const ALL: [LimbChannel; 6] = [
        LimbChannel::Body,
        LimbChannel::Head,
        LimbChannel::LeftArm,
        LimbChannel::RightArm,
        LimbChannel::LeftLeg,
        LimbChannel::RightLeg,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// 常见骨骼命名 → 通道（键为去掉分隔符后的小写名称）
static BONE_ALIASES: Lazy<HashMap<&'static str, LimbChannel>> = Lazy::new(|| {
    use LimbChannel::*;
    HashMap::from([
        ("body", Body),
        ("spine", Body),
        ("torso", Body),
        ("hips", Body),
        ("pelvis", Body),
        ("chest", Body),
        ("mixamorighips", Body),
        ("head", Head),
        ("skull", Head),
        ("neck", Head),
        ("mixamorighead", Head),
        ("leftarm", LeftArm),
        ("larm", LeftArm),
        ("arml", LeftArm),
        ("upperarml", LeftArm),
        ("leftupperarm", LeftArm),
        ("mixamorigleftarm", LeftArm),
        ("rightarm", RightArm),
        ("rarm", RightArm),
        ("armr", RightArm),
        ("upperarmr", RightArm),
        ("rightupperarm", RightArm),
        ("mixamorigrightarm", RightArm),
        ("leftleg", LeftLeg),
        ("lleg", LeftLeg),
        ("legl", LeftLeg),
        ("thighl", LeftLeg),
        ("leftthigh", LeftLeg),
        ("leftupleg", LeftLeg),
        ("mixamorigleftupleg", LeftLeg),
        ("rightleg", RightLeg),
        ("rleg", RightLeg),
        ("legr", RightLeg),
        ("thighr", RightLeg),
        ("rightthigh", RightLeg),
        ("rightupleg", RightLeg),
        ("mixamorigrightupleg", RightLeg),
    ])
});

/// 名称归一化：小写并去掉 `_` `-` `.` `:` 和空格
fn normalize_bone_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ':' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// 骨骼映射
// ============================================================================

/// 通道 → 宿主骨骼
///
/// 未映射的通道在动画时直接跳过，对应骨骼保持宿主写入的姿势。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneMapping {
    bones: [Option<BoneId>; 6],
}

impl BoneMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置
    pub fn with(mut self, channel: LimbChannel, bone: BoneId) -> Self {
        self.set(channel, bone);
        self
    }

    pub fn set(&mut self, channel: LimbChannel, bone: BoneId) {
        self.bones[channel.index()] = Some(bone);
    }

    #[inline]
    pub fn get(&self, channel: LimbChannel) -> Option<BoneId> {
        self.bones[channel.index()]
    }

    /// 已映射的通道数量
    pub fn len(&self) -> usize {
        self.bones.iter().filter(|b| b.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按宿主骨骼名称建立映射，找不到的名称跳过
    pub fn from_names<S: SceneGraph + ?Sized>(scene: &S, names: &[(LimbChannel, &str)]) -> Self {
        let mut mapping = Self::new();
        for &(channel, name) in names {
            match scene.find_bone(name) {
                Some(bone) => mapping.set(channel, bone),
                None => log::warn!("[Animator] 骨骼 '{}' 不存在，通道 {:?} 将被跳过", name, channel),
            }
        }
        mapping
    }

    /// 按常见命名自动识别，每个通道取第一个匹配的骨骼
    pub fn detect<'a, I>(bones: I) -> Self
    where
        I: IntoIterator<Item = (BoneId, &'a str)>,
    {
        let mut mapping = Self::new();
        for (bone, name) in bones {
            if let Some(&channel) = BONE_ALIASES.get(normalize_bone_name(name).as_str()) {
                if mapping.get(channel).is_none() {
                    mapping.set(channel, bone);
                }
            }
        }
        log::debug!("[Animator] 自动识别 {} 个肢体通道", mapping.len());
        mapping
    }

    /// 对骨骼集合自动识别
    pub fn auto_detect(set: &BoneSet) -> Self {
        Self::detect(set.bone_names().enumerate().map(|(i, name)| (BoneId(i), name)))
    }
}

// ============================================================================
// 基础姿势跟踪
// ============================================================================

/// 判定宿主是否改写过骨骼的容差
const HOST_WRITE_EPSILON: f32 = 1e-6;

/// 单根骨骼的基础姿势
///
/// 振荡偏移叠加在基础姿势上，基础姿势归宿主所有：
/// 骨骼当前值与上次写入值不同，说明宿主（或 IK）改写过，取当前值为新的基础姿势；
/// 否则沿用旧的基础姿势，偏移不会逐帧累积。
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BasePose {
    position: Vec3,
    rotation: Quat,
    written_position: Vec3,
    written_rotation: Quat,
}

impl BasePose {
    /// 以绑定姿势旋转为基础，位置沿用当前值
    ///
    /// 写入记录取当前值，下次叠加时旋转回到绑定姿势。
    pub(crate) fn at_rest<S: SceneGraph + ?Sized>(scene: &S, bone: BoneId) -> Option<BasePose> {
        let position = scene.local_position(bone)?;
        Some(BasePose {
            position,
            rotation: scene.rest_rotation(bone)?,
            written_position: position,
            written_rotation: scene.local_rotation(bone)?,
        })
    }

    /// 在基础姿势上叠加偏移并写回骨骼
    ///
    /// 欧拉角顺序为 XYZ（pitch, yaw, roll），旋转偏移右乘。
    pub(crate) fn apply<S: SceneGraph + ?Sized>(
        slot: &mut Option<BasePose>,
        scene: &mut S,
        bone: BoneId,
        position_offset: Vec3,
        euler: Vec3,
    ) {
        let (Some(current_position), Some(current_rotation)) = (scene.local_position(bone), scene.local_rotation(bone))
        else {
            return;
        };

        let (position, rotation) = match slot {
            Some(base) => {
                let position = if current_position.abs_diff_eq(base.written_position, HOST_WRITE_EPSILON) {
                    base.position
                } else {
                    current_position
                };
                let rotation = if current_rotation.abs_diff_eq(base.written_rotation, HOST_WRITE_EPSILON) {
                    base.rotation
                } else {
                    current_rotation
                };
                (position, rotation)
            }
            None => (current_position, current_rotation),
        };

        scene.set_local_position(bone, position + position_offset);
        scene.set_local_rotation(bone, rotation * Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z));
        scene.propagate(bone);

        // 读回实际写入值（锁定的骨骼会忽略写入）
        *slot = Some(BasePose {
            position,
            rotation,
            written_position: scene.local_position(bone).unwrap_or(current_position),
            written_rotation: scene.local_rotation(bone).unwrap_or(current_rotation),
        });
    }
}

//! 生物程序化动画骨骼系统
//!
//! 模块划分（从底层到上层）：
//! - skeleton: 场景图适配层（骨骼竞技场 + 父索引）
//! - ik: 双骨骼解析 IK、FABRIK 链 IK、CCD 触手 IK
//! - animator: 无动画片段生物的程序化振荡器
//! - foot: 地形射线 + 双骨骼 IK 的脚步贴地
//! - blend: 混合树
//! - rig: 每帧按固定顺序驱动以上子系统

pub mod animator;
pub mod blend;
pub mod config;
pub mod foot;
pub mod ik;
pub mod rig;
pub mod skeleton;

pub use animator::{BoneMapping, FinSide, LimbChannel, ProceduralAnimator, SwimAnimator, TentacleController};
pub use blend::{BlendNode, BlendTree, Blendable, DirectionalMode, LeafSource, Pose};
pub use config::RigConfig;
pub use foot::{ColliderTerrain, FlatGround, FootPlacement, FootReport, HeightFn, LegBinding, NoTerrain, TerrainHit, TerrainQuery};
pub use ik::{CcdSolver, FabrikChain, FabrikOutcome, TwoBoneIk, TwoBoneSolution};
pub use rig::{CreatureRig, RigAction, RigBatch, RigInput};
pub use skeleton::{BoneId, BoneSet, BoneTransform, SceneGraph};

use thiserror::Error;

/// 骨骼系统错误
///
/// 只在构建阶段出现；每帧求解不会失败。
#[derive(Debug, Error)]
pub enum RigError {
    #[error("bone index {0} out of range")]
    UnknownBone(usize),

    #[error("bone not found: {0}")]
    BoneNotFound(String),

    #[error("duplicate bone name: {0}")]
    DuplicateBoneName(String),

    #[error("bone '{bone}' has invalid parent index {parent}")]
    InvalidParent { bone: String, parent: usize },

    #[error("bone {child} is not a child of bone {parent}")]
    BrokenChain { parent: usize, child: usize },

    #[error("chain needs at least {required} bones, got {actual}")]
    ChainTooShort { required: usize, actual: usize },

    #[error("segment starting at bone {0} has zero length")]
    DegenerateSegment(usize),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("blend node {0} does not exist")]
    UnknownBlendNode(usize),
}

pub type Result<T> = std::result::Result<T, RigError>;

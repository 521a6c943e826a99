//! 生物骨骼整合
//!
//! 每帧固定顺序：
//! 0. 根骨骼放到身体位置、朝向前方（可选）
//! 1. 混合树求出移动速度，程序化动画在宿主姿势上叠加振荡偏移
//! 2. 脚步贴地（射线 + 双骨骼 IK）
//! 3. FABRIK 链、触手（CCD 伸展 / 波动）
//! 4. 刷新世界变换

use glam::{Quat, Vec3};
use rayon::prelude::*;

use crate::animator::{ProceduralAnimator, SwimAnimator, TentacleController};
use crate::blend::BlendTree;
use crate::config::RigConfig;
use crate::foot::{FootPlacement, TerrainQuery};
use crate::ik::{safe_normalize, FabrikChain, FORWARD};
use crate::skeleton::{BoneId, BoneSet, SceneGraph};
use crate::{Result, RigError};

/// 低于此速度视为原地待机
const IDLE_SPEED: f32 = 1e-3;

/// 叠加在移动之上的一次性动作
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RigAction {
    /// 攻击，参数为进度 [0, 1]
    Attack(f32),
    /// 受击，参数为强度
    Hit(f32),
}

/// 每帧输入
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigInput {
    pub body_position: Vec3,
    pub forward: Vec3,
}

impl RigInput {
    pub fn new(body_position: Vec3, forward: Vec3) -> Self {
        Self { body_position, forward }
    }
}

#[derive(Clone, Debug)]
struct ChainDriver {
    chain: FabrikChain,
    target: Option<Vec3>,
    pole: Option<Vec3>,
}

/// 单个生物的骨骼驱动
///
/// 持有自己的场景图（或宿主适配器），与其他生物不共享骨骼。
#[derive(Clone, Debug)]
pub struct CreatureRig<S: SceneGraph = BoneSet> {
    scene: S,
    config: RigConfig,
    animator: Option<ProceduralAnimator>,
    swim: Option<SwimAnimator>,
    feet: Option<FootPlacement>,
    chains: Vec<ChainDriver>,
    tentacles: Vec<TentacleController>,
    /// 每帧跟随 `RigInput` 的根骨骼
    root: Option<BoneId>,
    /// 输出移动速度的混合树
    locomotion: BlendTree<f32>,
    action: Option<RigAction>,
    time: f32,
    speed: f32,
}

impl<S: SceneGraph> CreatureRig<S> {
    pub fn new(scene: S, config: &RigConfig) -> Result<Self> {
        config.validate()?;
        log::info!("[Rig] 创建生物骨骼: {} 根骨骼", scene.bone_count());
        Ok(Self {
            scene,
            config: config.clone(),
            animator: None,
            swim: None,
            feet: None,
            chains: Vec::new(),
            tentacles: Vec::new(),
            root: None,
            locomotion: BlendTree::new(),
            action: None,
            time: 0.0,
            speed: 0.0,
        })
    }

    // ========================================
    // 访问器
    // ========================================

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn into_scene(self) -> S {
        self.scene
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn animator(&self) -> Option<&ProceduralAnimator> {
        self.animator.as_ref()
    }

    pub fn feet(&self) -> Option<&FootPlacement> {
        self.feet.as_ref()
    }

    pub fn feet_mut(&mut self) -> Option<&mut FootPlacement> {
        self.feet.as_mut()
    }

    pub fn locomotion(&self) -> &BlendTree<f32> {
        &self.locomotion
    }

    /// 移动混合树（宿主每帧更新方向 / 权重）
    pub fn locomotion_mut(&mut self) -> &mut BlendTree<f32> {
        &mut self.locomotion
    }

    /// 上一帧的移动速度
    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.time
    }

    // ========================================
    // 组装
    // ========================================

    pub fn set_animator(&mut self, animator: ProceduralAnimator) {
        self.animator = Some(animator);
    }

    pub fn set_swim(&mut self, swim: SwimAnimator) {
        self.swim = Some(swim);
    }

    pub fn set_feet(&mut self, feet: FootPlacement) {
        self.feet = Some(feet);
    }

    pub fn set_locomotion(&mut self, tree: BlendTree<f32>) {
        self.locomotion = tree;
    }

    /// 添加 FABRIK 链，返回链索引
    pub fn add_chain(&mut self, chain: FabrikChain) -> usize {
        self.chains.push(ChainDriver {
            chain,
            target: None,
            pole: None,
        });
        self.chains.len() - 1
    }

    /// 设置链目标，`None` 表示本帧不求解
    pub fn set_chain_target(&mut self, chain: usize, target: Option<Vec3>, pole: Option<Vec3>) -> Result<()> {
        let driver = self
            .chains
            .get_mut(chain)
            .ok_or_else(|| RigError::InvalidConfig(format!("chain {} does not exist", chain)))?;
        driver.target = target;
        driver.pole = pole;
        Ok(())
    }

    pub fn chain(&self, chain: usize) -> Option<&FabrikChain> {
        self.chains.get(chain).map(|d| &d.chain)
    }

    /// 添加触手，返回索引
    pub fn add_tentacle(&mut self, tentacle: TentacleController) -> usize {
        self.tentacles.push(tentacle);
        self.tentacles.len() - 1
    }

    /// 设置触手目标，`None` 时触手恢复波动
    pub fn set_tentacle_target(&mut self, tentacle: usize, target: Option<Vec3>) -> Result<()> {
        self.tentacles
            .get_mut(tentacle)
            .ok_or_else(|| RigError::InvalidConfig(format!("tentacle {} does not exist", tentacle)))?
            .set_target(target);
        Ok(())
    }

    pub fn tentacle(&self, tentacle: usize) -> Option<&TentacleController> {
        self.tentacles.get(tentacle)
    }

    /// 指定根骨骼：每帧放到 `body_position`，绕 Y 轴转向 `forward`
    ///
    /// 不指定时根骨骼由宿主移动。
    pub fn set_root_bone(&mut self, bone: BoneId) -> Result<()> {
        if bone.index() >= self.scene.bone_count() {
            return Err(RigError::UnknownBone(bone.index()));
        }
        self.root = Some(bone);
        Ok(())
    }

    #[inline]
    pub fn root_bone(&self) -> Option<BoneId> {
        self.root
    }

    /// 设置叠加动作，持续到 `clear_action`
    pub fn set_action(&mut self, action: RigAction) {
        self.action = Some(action);
    }

    pub fn clear_action(&mut self) {
        self.action = None;
    }

    // ========================================
    // 每帧更新
    // ========================================

    /// 按固定顺序推进一帧
    pub fn tick<T: TerrainQuery + ?Sized>(&mut self, dt: f32, input: RigInput, terrain: &T) {
        self.time += dt;

        // 0. 根骨骼
        if let Some(root) = self.root {
            self.place_root(root, input);
        }

        // 1. 混合树 → 程序化动画
        self.speed = self.locomotion.evaluate(self.time).max(0.0);
        if let Some(animator) = &mut self.animator {
            if self.speed > IDLE_SPEED {
                animator.walk(&mut self.scene, dt, self.speed);
            } else {
                animator.idle(&mut self.scene, dt);
            }
            match self.action {
                Some(RigAction::Attack(progress)) => animator.attack(&mut self.scene, dt, progress),
                Some(RigAction::Hit(intensity)) => animator.hit(&mut self.scene, dt, intensity),
                None => {}
            }
        }
        if let Some(swim) = &mut self.swim {
            let velocity = input.forward.normalize_or_zero() * self.speed;
            swim.animate(&mut self.scene, dt, velocity);
        }

        // 2. 脚步贴地
        if let Some(feet) = &mut self.feet {
            feet.update(dt, &mut self.scene, input.body_position, input.forward, terrain);
        }

        // 3. 链 IK
        for driver in &mut self.chains {
            if let Some(target) = driver.target {
                driver.chain.solve(&mut self.scene, target, driver.pole);
            }
        }
        for tentacle in &mut self.tentacles {
            tentacle.animate(&mut self.scene, dt);
        }

        // 4. 写回
        self.scene.update_world_transforms();
    }

    /// 世界空间的位置 / 朝向换算到父骨骼空间后写入（父骨骼不含缩放）
    fn place_root(&mut self, root: BoneId, input: RigInput) {
        let forward = safe_normalize(Vec3::new(input.forward.x, 0.0, input.forward.z), FORWARD);
        let facing = Quat::from_rotation_y(forward.x.atan2(forward.z));

        let parent_rotation = self.scene.parent_world_rotation(root);
        let parent_position = self
            .scene
            .parent(root)
            .and_then(|p| self.scene.world_position(p))
            .unwrap_or(Vec3::ZERO);
        let rest = self.scene.rest_rotation(root).unwrap_or(Quat::IDENTITY);

        let inverse = parent_rotation.inverse();
        self.scene
            .set_local_position(root, inverse * (input.body_position - parent_position));
        self.scene.set_local_rotation(root, inverse * facing * rest);
        self.scene.propagate(root);
    }
}

// ============================================================================
// 批量更新
// ============================================================================

/// 多个生物并行更新
///
/// 每个生物持有互不相交的骨骼，rayon 并行时无需加锁。
#[derive(Debug)]
pub struct RigBatch<S: SceneGraph = BoneSet> {
    rigs: Vec<CreatureRig<S>>,
}

impl<S: SceneGraph> Default for RigBatch<S> {
    fn default() -> Self {
        Self { rigs: Vec::new() }
    }
}

impl<S: SceneGraph + Send> RigBatch<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rig: CreatureRig<S>) -> usize {
        self.rigs.push(rig);
        self.rigs.len() - 1
    }

    pub fn len(&self) -> usize {
        self.rigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CreatureRig<S>> {
        self.rigs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CreatureRig<S>> {
        self.rigs.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CreatureRig<S>> {
        self.rigs.iter()
    }

    /// 并行推进所有生物，`inputs` 与生物一一对应
    ///
    /// 缺少输入的生物本帧跳过。
    pub fn tick_all<T>(&mut self, dt: f32, inputs: &[RigInput], terrain: &T)
    where
        T: TerrainQuery + Sync + ?Sized,
    {
        if inputs.len() != self.rigs.len() {
            log::warn!(
                "[Rig] 输入数量 {} 与生物数量 {} 不一致",
                inputs.len(),
                self.rigs.len()
            );
        }

        self.rigs
            .par_iter_mut()
            .zip(inputs.par_iter())
            .for_each(|(rig, input)| rig.tick(dt, *input, terrain));
    }
}

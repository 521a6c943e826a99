//! 水下生物游动动画
//!
//! 鳍、尾巴（触手波动）和身体分段都是相位驱动的正弦偏移，
//! 同样叠加在宿主的基础姿势上。

use std::f32::consts::{FRAC_PI_4, PI};

use glam::Vec3;

use crate::config::RigConfig;
use crate::ik::CcdSolver;
use crate::skeleton::{BoneId, SceneGraph};
use crate::Result;

use super::BasePose;

/// 鳍所在一侧
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinSide {
    Left,
    Right,
}

impl FinSide {
    /// 基础偏航角，两侧镜像
    #[inline]
    pub fn base_yaw(self) -> f32 {
        match self {
            FinSide::Left => FRAC_PI_4,
            FinSide::Right => -FRAC_PI_4,
        }
    }
}

// ============================================================================
// 鳍
// ============================================================================

/// 鳍拍动
#[derive(Clone, Debug)]
pub struct FinFlapper {
    pub bone: BoneId,
    pub side: FinSide,
    pub frequency: f32,
    pub amplitude: f32,
    time: f32,
    base: Option<BasePose>,
}

impl FinFlapper {
    pub fn new(bone: BoneId, side: FinSide, config: &RigConfig) -> Self {
        Self {
            bone,
            side,
            frequency: config.fin_frequency,
            amplitude: config.fin_amplitude,
            time: 0.0,
            base: None,
        }
    }

    /// 当前欧拉角 (pitch, yaw, roll)
    pub fn euler(&self) -> Vec3 {
        Vec3::new(
            (self.time * 0.5).cos() * self.amplitude * 0.3,
            self.side.base_yaw(),
            self.time.sin() * self.amplitude,
        )
    }

    /// 推进并写回，`speed` 为归一化游速，越快拍得越快
    pub fn update<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, dt: f32, speed: f32) {
        self.time += dt * self.frequency * (1.0 + speed);
        let euler = self.euler();
        BasePose::apply(&mut self.base, scene, self.bone, Vec3::ZERO, euler);
    }
}

// ============================================================================
// 触手 / 尾巴波动
// ============================================================================

/// 沿关节链传播的正弦波
#[derive(Clone, Debug)]
pub struct TentacleWave {
    joints: Vec<BoneId>,
    pub frequency: f32,
    pub amplitude: f32,
    bases: Vec<Option<BasePose>>,
}

impl TentacleWave {
    pub fn new(joints: Vec<BoneId>, config: &RigConfig) -> Self {
        Self {
            bases: vec![None; joints.len()],
            joints,
            frequency: config.swim_frequency,
            amplitude: config.swim_amplitude,
        }
    }

    pub fn joints(&self) -> &[BoneId] {
        &self.joints
    }

    /// 第 `i` 个关节在 `elapsed` 时刻的欧拉角
    ///
    /// 振幅向末端线性衰减到一半。
    pub fn joint_euler(&self, i: usize, elapsed: f32) -> Vec3 {
        let t = i as f32 / self.joints.len().max(1) as f32;
        let phase = t * PI * 2.0 + elapsed * self.frequency;
        let falloff = 1.0 - t * 0.5;
        Vec3::new(
            (phase * 0.7).cos() * self.amplitude * 0.5 * falloff,
            phase.sin() * self.amplitude * falloff,
            0.0,
        )
    }

    /// 按绝对时间写回所有关节
    pub fn update<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, elapsed: f32) {
        for i in 0..self.joints.len() {
            let euler = self.joint_euler(i, elapsed);
            BasePose::apply(&mut self.bases[i], scene, self.joints[i], Vec3::ZERO, euler);
        }
    }

    /// 下次更新时以绑定姿势为基础，丢弃其他系统留下的旋转
    pub fn return_to_rest<S: SceneGraph + ?Sized>(&mut self, scene: &S) {
        for (slot, &joint) in self.bases.iter_mut().zip(self.joints.iter()) {
            *slot = BasePose::at_rest(scene, joint);
        }
    }
}

// ============================================================================
// 触手控制器
// ============================================================================

/// 单条触手：有目标时 CCD 伸展，无目标时正弦波动
///
/// 波动与伸展共用同一组关节。从伸展切回波动时关节回到绑定姿势再叠加波形。
#[derive(Clone, Debug)]
pub struct TentacleController {
    wave: TentacleWave,
    reach: CcdSolver,
    target: Option<Vec3>,
    reaching: bool,
    time: f32,
}

impl TentacleController {
    /// `joints` 为根到末端的关节，`tip` 为最后一个关节的子骨骼
    pub fn new<S: SceneGraph + ?Sized>(
        scene: &S,
        joints: Vec<BoneId>,
        tip: BoneId,
        config: &RigConfig,
    ) -> Result<Self> {
        let reach = CcdSolver::new(scene, joints.clone(), tip, config)?;
        Ok(Self {
            wave: TentacleWave::new(joints, config),
            reach,
            target: None,
            reaching: false,
            time: 0.0,
        })
    }

    pub fn set_target(&mut self, target: Option<Vec3>) {
        self.target = target;
    }

    #[inline]
    pub fn target(&self) -> Option<Vec3> {
        self.target
    }

    /// 上一帧是否处于伸展模式
    #[inline]
    pub fn is_reaching(&self) -> bool {
        self.reaching
    }

    pub fn wave(&self) -> &TentacleWave {
        &self.wave
    }

    pub fn wave_mut(&mut self) -> &mut TentacleWave {
        &mut self.wave
    }

    pub fn solver(&self) -> &CcdSolver {
        &self.reach
    }

    pub fn solver_mut(&mut self) -> &mut CcdSolver {
        &mut self.reach
    }

    /// 推进一帧，伸展模式下返回末端到目标的距离
    pub fn animate<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, dt: f32) -> Option<f32> {
        self.time += dt;
        match self.target {
            Some(target) => {
                self.reaching = true;
                Some(self.reach.solve(scene, target))
            }
            None => {
                if self.reaching {
                    log::debug!("[Animator] 触手 #{} 失去目标，恢复波动", self.reach.tip().index());
                    self.wave.return_to_rest(scene);
                    self.reaching = false;
                }
                self.wave.update(scene, self.time);
                None
            }
        }
    }
}

// ============================================================================
// 游动动画器
// ============================================================================

/// 游动动画器：鳍 + 可选尾巴 + 可选身体分段
#[derive(Clone, Debug)]
pub struct SwimAnimator {
    fins: Vec<FinFlapper>,
    tail: Option<TentacleWave>,
    body_segments: Vec<BoneId>,
    segment_bases: Vec<Option<BasePose>>,
    time: f32,
    max_speed: f32,
    config: RigConfig,
}

impl SwimAnimator {
    pub fn new(config: &RigConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fins: Vec::new(),
            tail: None,
            body_segments: Vec::new(),
            segment_bases: Vec::new(),
            time: 0.0,
            max_speed: config.max_swim_speed,
            config: config.clone(),
        })
    }

    /// 添加一片鳍
    pub fn with_fin(mut self, bone: BoneId, side: FinSide) -> Self {
        self.fins.push(FinFlapper::new(bone, side, &self.config));
        self
    }

    /// 设置尾巴关节链
    pub fn with_tail(mut self, joints: Vec<BoneId>) -> Self {
        self.tail = Some(TentacleWave::new(joints, &self.config));
        self
    }

    /// 设置身体分段（头到尾）
    pub fn with_body_segments(mut self, segments: Vec<BoneId>) -> Self {
        self.segment_bases = vec![None; segments.len()];
        self.body_segments = segments;
        self
    }

    pub fn fins(&self) -> &[FinFlapper] {
        &self.fins
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.time
    }

    /// 速度归一化到 [0, 1]
    #[inline]
    pub fn normalized_speed(&self, velocity: Vec3) -> f32 {
        (velocity.length() / self.max_speed).min(1.0)
    }

    /// 身体第 `i` 段的偏航角
    pub fn body_yaw(&self, i: usize, speed: f32) -> f32 {
        let t = i as f32 / self.body_segments.len().max(1) as f32;
        let frequency = 3.0 + speed * 2.0;
        let amplitude = 0.1 + speed * 0.2;
        (self.time * frequency + t * PI * 2.0).sin() * amplitude * (1.0 - t)
    }

    /// 推进一帧
    pub fn animate<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, dt: f32, velocity: Vec3) {
        self.time += dt;
        let speed = self.normalized_speed(velocity);

        for fin in &mut self.fins {
            fin.update(scene, dt, speed);
        }

        if let Some(tail) = &mut self.tail {
            tail.update(scene, self.time);
        }

        for i in 0..self.body_segments.len() {
            let yaw = self.body_yaw(i, speed);
            BasePose::apply(&mut self.segment_bases[i], scene, self.body_segments[i], Vec3::ZERO, Vec3::new(0.0, yaw, 0.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::BoneSet;
    use glam::{EulerRot, Quat};

    fn fish() -> (BoneSet, BoneId, BoneId, Vec<BoneId>) {
        let mut set = BoneSet::new();
        let body = set.add_bone("body", None, Vec3::ZERO, Quat::IDENTITY).unwrap();
        let lfin = set.add_bone("fin_l", Some(body), Vec3::new(-0.5, 0.0, 0.0), Quat::IDENTITY).unwrap();
        let rfin = set.add_bone("fin_r", Some(body), Vec3::new(0.5, 0.0, 0.0), Quat::IDENTITY).unwrap();
        let mut tail = Vec::new();
        let mut parent = body;
        for i in 0..4 {
            parent = set
                .add_bone(&format!("tail{}", i), Some(parent), Vec3::new(0.0, 0.0, -0.3), Quat::IDENTITY)
                .unwrap();
            tail.push(parent);
        }
        (set, lfin, rfin, tail)
    }

    #[test]
    fn test_fins_are_mirrored() {
        let (mut set, lfin, rfin, _) = fish();
        let config = RigConfig::default();
        let mut left = FinFlapper::new(lfin, FinSide::Left, &config);
        let mut right = FinFlapper::new(rfin, FinSide::Right, &config);
        left.update(&mut set, 0.1, 0.0);
        right.update(&mut set, 0.1, 0.0);

        let l = left.euler();
        let r = right.euler();
        assert!((l.y + r.y).abs() < 1e-6);
        assert!((l.z - r.z).abs() < 1e-6);
        assert!((l.z - (0.3f32).sin() * 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_fin_speeds_up_with_speed() {
        let (mut set, lfin, _, _) = fish();
        let config = RigConfig::default();
        let mut slow = FinFlapper::new(lfin, FinSide::Left, &config);
        let mut fast = FinFlapper::new(lfin, FinSide::Left, &config);
        slow.update(&mut set, 0.1, 0.0);
        fast.update(&mut set, 0.1, 1.0);
        assert!((fast.time - 2.0 * slow.time).abs() < 1e-6);
    }

    #[test]
    fn test_tentacle_wave_falloff() {
        let (_, _, _, tail) = fish();
        let wave = TentacleWave::new(tail, &RigConfig::default());
        let root = wave.joint_euler(0, 0.25);
        assert!((root.y - (0.5f32).sin() * 0.5).abs() < 1e-6);

        // 末端振幅包络更小
        let tip_envelope = 1.0 - 0.75 * 0.5;
        let tip = wave.joint_euler(3, 0.25);
        assert!(tip.y.abs() <= 0.5 * tip_envelope + 1e-6);
    }

    #[test]
    fn test_swim_animator_writes_bones() {
        let (mut set, lfin, rfin, tail) = fish();
        let config = RigConfig::default();
        let mut swim = SwimAnimator::new(&config)
            .unwrap()
            .with_fin(lfin, FinSide::Left)
            .with_fin(rfin, FinSide::Right)
            .with_tail(tail.clone());

        swim.animate(&mut set, 0.1, Vec3::new(0.0, 0.0, 20.0));
        assert!((swim.elapsed() - 0.1).abs() < 1e-6);
        assert_eq!(swim.normalized_speed(Vec3::new(0.0, 0.0, 20.0)), 1.0);
        assert_eq!(swim.normalized_speed(Vec3::new(5.0, 0.0, 0.0)), 0.5);

        let (_, yaw, _) = set.local_rotation(lfin).unwrap().to_euler(EulerRot::XYZ);
        assert!((yaw - FRAC_PI_4).abs() < 1e-4);
        assert!(!set.local_rotation(tail[0]).unwrap().abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_tentacle_switches_between_reach_and_wave() {
        let (mut set, _, _, tail) = fish();
        let config = RigConfig::default();
        let joints = tail[..3].to_vec();
        let mut tentacle = TentacleController::new(&set, joints.clone(), tail[3], &config).unwrap();

        // 无目标：按波形写入
        assert!(tentacle.animate(&mut set, 0.1).is_none());
        assert!(!tentacle.is_reaching());
        let expected = tentacle.wave().joint_euler(0, 0.1);
        let (pitch, yaw, _) = set.local_rotation(joints[0]).unwrap().to_euler(EulerRot::XYZ);
        assert!((pitch - expected.x).abs() < 1e-4 && (yaw - expected.y).abs() < 1e-4);

        // 有目标：CCD 逐帧逼近
        let target = Vec3::new(0.4, 0.3, -0.5);
        tentacle.set_target(Some(target));
        let first = tentacle.animate(&mut set, 0.016).unwrap();
        let mut last = first;
        for _ in 0..100 {
            last = tentacle.animate(&mut set, 0.016).unwrap();
        }
        assert!(tentacle.is_reaching());
        assert!(last < first);

        // 目标消失：回到绑定姿势上的波形
        tentacle.set_target(None);
        assert!(tentacle.animate(&mut set, 0.016).is_none());
        let elapsed = 0.1 + 0.016 * 102.0;
        let expected = tentacle.wave().joint_euler(0, elapsed);
        let want = Quat::from_euler(EulerRot::XYZ, expected.x, expected.y, expected.z);
        assert!(set.local_rotation(joints[0]).unwrap().abs_diff_eq(want, 1e-4));
    }

    #[test]
    fn test_body_undulation() {
        let (mut set, _, _, tail) = fish();
        let mut swim = SwimAnimator::new(&RigConfig::default())
            .unwrap()
            .with_body_segments(tail.clone());
        swim.animate(&mut set, 0.2, Vec3::ZERO);

        let expected = (0.2f32 * 3.0).sin() * 0.1;
        assert!((swim.body_yaw(0, 0.0) - expected).abs() < 1e-6);
        let (_, yaw, _) = set.local_rotation(tail[0]).unwrap().to_euler(EulerRot::XYZ);
        assert!((yaw - expected).abs() < 1e-4);
    }
}

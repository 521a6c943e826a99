//! 肢体振荡器
//!
//! 单一相位累加器驱动全部正弦偏移，运动 C¹ 连续。
//! 相位不取模，正弦的周期性自然回绕。

use std::f32::consts::PI;

use glam::Vec3;

use crate::config::RigConfig;
use crate::skeleton::SceneGraph;
use crate::Result;

use super::{BasePose, BoneMapping, LimbChannel};

/// 单个通道相对基础姿势的偏移
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LimbOffset {
    /// 位置偏移
    pub position: Vec3,
    /// 欧拉角偏移 (pitch, yaw, roll)
    pub euler: Vec3,
}

/// 程序化肢体动画器
#[derive(Clone, Debug)]
pub struct ProceduralAnimator {
    mapping: BoneMapping,
    /// 待机 / 行走共用的相位
    phase: f32,
    /// 受击抖动时钟
    shake_clock: f32,
    /// 相位速率倍数
    pub speed_scale: f32,
    offsets: [LimbOffset; 6],
    bases: [Option<BasePose>; 6],
    config: RigConfig,
}

impl ProceduralAnimator {
    pub fn new(mapping: BoneMapping, config: &RigConfig) -> Result<Self> {
        config.validate()?;
        if mapping.is_empty() {
            log::warn!("[Animator] 骨骼映射为空，动画器不会驱动任何骨骼");
        }
        Ok(Self {
            mapping,
            phase: 0.0,
            shake_clock: 0.0,
            speed_scale: 1.0,
            offsets: [LimbOffset::default(); 6],
            bases: [None; 6],
            config: config.clone(),
        })
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn mapping(&self) -> &BoneMapping {
        &self.mapping
    }

    /// 通道当前偏移
    #[inline]
    pub fn offset(&self, channel: LimbChannel) -> LimbOffset {
        self.offsets[channel.index()]
    }

    /// 待机呼吸
    pub fn idle<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, dt: f32) {
        self.phase += dt * self.config.idle_rate * self.speed_scale;
        let phase = self.phase;

        let body = &mut self.offsets[LimbChannel::Body.index()];
        body.position.y = phase.sin() * 0.02;
        body.euler.z = (phase * 0.5).sin() * 0.01;

        self.apply(scene, &[LimbChannel::Body]);
    }

    /// 行走循环
    pub fn walk<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, dt: f32, speed: f32) {
        self.phase += dt * speed * self.config.walk_speed * self.speed_scale;
        let phase = self.phase;
        let swing = phase.sin();
        let c = &self.config;

        let body = &mut self.offsets[LimbChannel::Body.index()];
        body.position.y = (phase * 2.0).sin().abs() * c.bob_amount;
        body.euler.z = swing * c.sway_amount;

        self.offsets[LimbChannel::Head.index()].euler.x = (phase * 2.0).sin() * c.head_nod;
        self.offsets[LimbChannel::RightArm.index()].euler.x = swing * c.arm_swing;
        self.offsets[LimbChannel::LeftArm.index()].euler.x = -swing * c.arm_swing;
        self.offsets[LimbChannel::RightLeg.index()].euler.x = -swing * c.leg_swing;
        self.offsets[LimbChannel::LeftLeg.index()].euler.x = swing * c.leg_swing;

        self.apply(scene, &LimbChannel::ALL);
    }

    /// 攻击挥臂，`progress` 0 为蓄力、1 为收招
    ///
    /// 不推进相位，攻击时序由宿主的动画事件决定。
    pub fn attack<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, _dt: f32, progress: f32) {
        let swing = (progress.clamp(0.0, 1.0) * PI).sin();

        let arm = &mut self.offsets[LimbChannel::RightArm.index()];
        arm.euler.x = -swing * self.config.attack_swing;
        arm.euler.z = swing * self.config.attack_roll;
        self.offsets[LimbChannel::Body.index()].euler.y = swing * self.config.attack_twist;

        self.apply(scene, &[LimbChannel::RightArm, LimbChannel::Body]);
    }

    /// 受击后仰 + 抖动
    pub fn hit<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, dt: f32, intensity: f32) {
        let decay = (-dt * self.config.hit_decay).exp();
        self.shake_clock += dt * self.config.hit_shake_rate;

        let body = &mut self.offsets[LimbChannel::Body.index()];
        body.euler.x = intensity * 0.3 * decay;
        body.position.y = self.shake_clock.sin().abs() * intensity * 0.2;

        self.apply(scene, &[LimbChannel::Body]);
    }

    /// 清零偏移，骨骼回到基础姿势
    pub fn reset<S: SceneGraph + ?Sized>(&mut self, scene: &mut S) {
        self.offsets = [LimbOffset::default(); 6];
        self.apply(scene, &LimbChannel::ALL);
    }

    fn apply<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, channels: &[LimbChannel]) {
        for &channel in channels {
            if let Some(bone) = self.mapping.get(channel) {
                let offset = self.offsets[channel.index()];
                BasePose::apply(&mut self.bases[channel.index()], scene, bone, offset.position, offset.euler);
            }
        }
    }
}

//! 脚步贴地
//!
//! 每帧流程（按腿注册顺序）：
//! 1. 由身体位置 + 步态相位计算期望落脚点
//! 2. 从落脚点正上方向下打射线
//! 3. 命中点（加间隙）作为双骨骼 IK 目标，极向量指向身体前方

use glam::Vec3;

use crate::config::RigConfig;
use crate::ik::{safe_normalize, TwoBoneIk, FORWARD};
use crate::skeleton::SceneGraph;
use crate::Result;

use super::terrain::TerrainQuery;

/// 单条腿本帧的结果
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FootReport {
    /// IK 目标
    pub target: Vec3,
    /// 使用的地面高度
    pub ground_y: f32,
    /// 射线是否命中
    pub grounded: bool,
    /// 本帧是否重新落脚
    pub stepping: bool,
}

/// 腿部绑定
#[derive(Clone, Debug)]
pub struct LegBinding {
    pub ik: TwoBoneIk,
    /// 步幅
    pub stride: f32,
    /// 步态相位偏移（双足通常交错 π）
    pub phase_offset: f32,
    /// 落脚点偏离超过此距离时重新落脚
    pub step_threshold: f32,
    /// 上次命中的地面高度
    pub last_ground_y: f32,
    planted: Option<Vec3>,
    report: FootReport,
}

impl LegBinding {
    pub fn new(ik: TwoBoneIk, phase_offset: f32, config: &RigConfig) -> Self {
        Self {
            ik,
            stride: config.default_stride,
            phase_offset,
            step_threshold: config.default_step_threshold,
            last_ground_y: 0.0,
            planted: None,
            report: FootReport::default(),
        }
    }

    pub fn with_stride(mut self, stride: f32) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_step_threshold(mut self, threshold: f32) -> Self {
        self.step_threshold = threshold;
        self
    }

    /// 当前落脚点
    pub fn planted(&self) -> Option<Vec3> {
        self.planted
    }

    /// 最近一帧的结果
    pub fn report(&self) -> &FootReport {
        &self.report
    }
}

/// 脚步贴地系统
#[derive(Clone, Debug)]
pub struct FootPlacement {
    legs: Vec<LegBinding>,
    /// 步态相位
    phase: f32,
    config: RigConfig,
}

impl FootPlacement {
    pub fn new(config: &RigConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            legs: Vec::new(),
            phase: 0.0,
            config: config.clone(),
        })
    }

    /// 注册一条腿，返回腿索引
    pub fn add_leg(&mut self, ik: TwoBoneIk, phase_offset: f32) -> usize {
        self.add_binding(LegBinding::new(ik, phase_offset, &self.config))
    }

    /// 注册自定义参数的腿
    pub fn add_binding(&mut self, binding: LegBinding) -> usize {
        log::debug!(
            "[FootIK] 腿 #{}: 步幅 {:.2}, 相位偏移 {:.2}",
            self.legs.len(),
            binding.stride,
            binding.phase_offset
        );
        self.legs.push(binding);
        self.legs.len() - 1
    }

    pub fn legs(&self) -> &[LegBinding] {
        &self.legs
    }

    pub fn leg_mut(&mut self, index: usize) -> Option<&mut LegBinding> {
        self.legs.get_mut(index)
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// 各腿最近一帧的结果（注册顺序）
    pub fn reports(&self) -> impl Iterator<Item = &FootReport> {
        self.legs.iter().map(LegBinding::report)
    }

    /// 每帧更新
    ///
    /// `forward` 只取水平分量，退化时朝向 +Z。
    pub fn update<S, T>(&mut self, dt: f32, scene: &mut S, body_position: Vec3, forward: Vec3, terrain: &T)
    where
        S: SceneGraph + ?Sized,
        T: TerrainQuery + ?Sized,
    {
        self.phase += dt * self.config.foot_step_rate;

        let forward = safe_normalize(Vec3::new(forward.x, 0.0, forward.z), FORWARD);
        let lateral = Vec3::Y.cross(forward);
        let pole = body_position + forward * self.config.pole_forward_distance;
        let ray_origin_y = body_position.y + self.config.foot_ray_height;

        for (i, leg) in self.legs.iter_mut().enumerate() {
            let side = if i % 2 == 0 { -1.0 } else { 1.0 };
            let swing = (self.phase + leg.phase_offset).sin() * leg.stride;
            let desired = body_position + lateral * (side * self.config.foot_lateral_offset) + forward * swing;

            let origin = Vec3::new(desired.x, ray_origin_y, desired.z);
            let hit = terrain.raycast(origin, Vec3::NEG_Y, self.config.foot_ray_length);
            let grounded = hit.is_some();
            let ground_y = match hit {
                Some(hit) => {
                    leg.last_ground_y = hit.point.y;
                    hit.point.y
                }
                None => leg.last_ground_y,
            };

            let target = Vec3::new(desired.x, ground_y + self.config.foot_clearance, desired.z);

            let stepping = match leg.planted {
                Some(planted) if planted.distance(target) <= leg.step_threshold => false,
                Some(_) => {
                    leg.planted = Some(target);
                    true
                }
                None => {
                    leg.planted = Some(target);
                    false
                }
            };

            if leg.ik.solve(scene, target, Some(pole)).is_none() {
                log::warn!("[FootIK] 腿 #{} 的骨骼不存在，跳过 IK", i);
            }

            leg.report = FootReport {
                target,
                ground_y,
                grounded,
                stepping,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foot::terrain::{FlatGround, HeightFn, NoTerrain};
    use crate::skeleton::{BoneId, BoneSet};
    use glam::Quat;

    /// 身体 + 两条腿，髋部高 1.0，腿长 0.5 + 0.5
    fn biped() -> (BoneSet, [(BoneId, BoneId, BoneId); 2]) {
        let mut set = BoneSet::new();
        let body = set.add_bone("body", None, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY).unwrap();
        let mut legs = [(BoneId(0), BoneId(0), BoneId(0)); 2];
        for (i, x) in [-0.3f32, 0.3].into_iter().enumerate() {
            let hip = set
                .add_bone(&format!("hip{}", i), Some(body), Vec3::new(x, 0.0, 0.0), Quat::IDENTITY)
                .unwrap();
            let knee = set
                .add_bone(&format!("knee{}", i), Some(hip), Vec3::new(0.0, -0.5, 0.0), Quat::IDENTITY)
                .unwrap();
            let foot = set
                .add_bone(&format!("foot{}", i), Some(knee), Vec3::new(0.0, -0.5, 0.0), Quat::IDENTITY)
                .unwrap();
            legs[i] = (hip, knee, foot);
        }
        (set, legs)
    }

    fn placement(set: &BoneSet, legs: &[(BoneId, BoneId, BoneId); 2]) -> FootPlacement {
        let config = RigConfig::default();
        let mut feet = FootPlacement::new(&config).unwrap();
        for (i, &(hip, knee, foot)) in legs.iter().enumerate() {
            let ik = TwoBoneIk::new(set, hip, knee, foot, &config).unwrap();
            feet.add_leg(ik, i as f32 * std::f32::consts::PI);
        }
        feet
    }

    #[test]
    fn test_feet_follow_flat_ground() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        let body = Vec3::new(0.0, 1.0, 0.0);

        feet.update(0.016, &mut set, body, Vec3::Z, &FlatGround::new(0.2));

        for (report, &(_, _, foot)) in feet.reports().zip(legs.iter()) {
            assert!(report.grounded);
            assert!((report.ground_y - 0.2).abs() < 1e-5);
            assert!((report.target.y - 0.2).abs() < 1e-5);
            let p = set.world_position(foot).unwrap();
            assert!(p.distance(report.target) < 1e-3);
        }
    }

    #[test]
    fn test_lateral_sign_alternates() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        feet.update(0.0, &mut set, Vec3::new(0.0, 1.0, 0.0), Vec3::Z, &FlatGround::new(0.0));

        let reports: Vec<_> = feet.reports().copied().collect();
        // 朝向 +Z 时侧向轴为 +X
        assert!((reports[0].target.x + 0.3).abs() < 1e-5);
        assert!((reports[1].target.x - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_lateral_axis_follows_facing() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        feet.update(0.0, &mut set, Vec3::new(0.0, 1.0, 0.0), Vec3::X, &FlatGround::new(0.0));

        let reports: Vec<_> = feet.reports().copied().collect();
        assert!((reports[0].target.z - 0.3).abs() < 1e-5);
        assert!((reports[1].target.z + 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_miss_keeps_last_ground_y() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        let body = Vec3::new(0.0, 1.0, 0.0);

        feet.update(0.016, &mut set, body, Vec3::Z, &FlatGround::new(0.25));
        for _ in 0..100 {
            feet.update(0.016, &mut set, body, Vec3::Z, &NoTerrain);
        }

        for leg in feet.legs() {
            assert_eq!(leg.last_ground_y, 0.25);
            assert!(!leg.report().grounded);
            assert!((leg.report().target.y - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_miss_from_start_stays_at_zero() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        for _ in 0..100 {
            feet.update(0.016, &mut set, Vec3::new(0.0, 1.0, 0.0), Vec3::Z, &NoTerrain);
        }
        assert!(feet.legs().iter().all(|leg| leg.last_ground_y == 0.0));
    }

    #[test]
    fn test_forward_swing_and_stepping() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        let ground = FlatGround::new(0.0);
        let body = Vec3::new(0.0, 1.0, 0.0);

        feet.update(0.0, &mut set, body, Vec3::Z, &ground);
        assert!(feet.reports().all(|r| !r.stepping));

        // 相位推进到 π/2：腿 0 向前 stride，腿 1 向后 stride
        let dt = std::f32::consts::FRAC_PI_2 / RigConfig::default().foot_step_rate;
        feet.update(dt, &mut set, body, Vec3::Z, &ground);
        let reports: Vec<_> = feet.reports().copied().collect();
        assert!((reports[0].target.z - 1.0).abs() < 1e-4);
        assert!((reports[1].target.z + 1.0).abs() < 1e-4);
        assert!(reports.iter().all(|r| r.stepping));
    }

    #[test]
    fn test_degenerate_forward_falls_back() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        feet.update(0.1, &mut set, Vec3::new(0.0, 1.0, 0.0), Vec3::Y, &FlatGround::new(0.0));
        for report in feet.reports() {
            assert!(report.target.is_finite());
        }
    }

    #[test]
    fn test_uneven_terrain() {
        let (mut set, legs) = biped();
        let mut feet = placement(&set, &legs);
        let slope = HeightFn::new(|x: f32, _z: f32| x * 0.5);
        feet.update(0.0, &mut set, Vec3::new(0.0, 1.0, 0.0), Vec3::Z, &slope);

        let reports: Vec<_> = feet.reports().copied().collect();
        assert!((reports[0].ground_y + 0.15).abs() < 1e-5);
        assert!((reports[1].ground_y - 0.15).abs() < 1e-5);
    }
}

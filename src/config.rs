//! 骨骼系统配置
//!
//! 所有参数扁平化，默认值集中在 `Default` 中。
//! 每个实例持有自己的配置副本，不存在全局共享状态。

use crate::{Result, RigError};

/// 骨骼系统配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct RigConfig {
    // ========== IK 求解 ==========
    /// FABRIK / CCD 最大迭代次数，默认 10
    pub ik_iterations: u32,
    /// 收敛阈值（末端到目标距离），默认 0.01
    pub ik_threshold: f32,
    /// 双骨骼最大伸展比例（防止完全伸直时除零），默认 0.999
    pub two_bone_reach_clamp: f32,
    /// 无法从绑定姿势推导时的大腿长度，默认 0.5
    pub default_upper_length: f32,
    /// 无法从绑定姿势推导时的小腿长度，默认 0.5
    pub default_lower_length: f32,

    // ========== CCD（触手伸展）==========
    /// 每次修正应用的角度比例，默认 0.5
    pub ccd_damping: f32,
    /// 向修正后旋转的 slerp 系数，默认 0.3
    pub ccd_slerp: f32,

    // ========== 程序化动画 ==========
    /// 行走相位速率倍数，默认 5.0
    pub walk_speed: f32,
    /// 待机呼吸相位速率，默认 2.0
    pub idle_rate: f32,
    /// 行走身体上下起伏，默认 0.1
    pub bob_amount: f32,
    /// 行走身体左右摇摆，默认 0.05
    pub sway_amount: f32,
    /// 行走点头幅度，默认 0.1
    pub head_nod: f32,
    /// 手臂摆动幅度，默认 0.5
    pub arm_swing: f32,
    /// 腿部摆动幅度，默认 0.4
    pub leg_swing: f32,
    /// 攻击挥臂幅度，默认 1.5
    pub attack_swing: f32,
    /// 攻击手臂侧倾，默认 0.3
    pub attack_roll: f32,
    /// 攻击身体扭转，默认 0.3
    pub attack_twist: f32,
    /// 受击指数衰减速率，默认 5.0
    pub hit_decay: f32,
    /// 受击抖动振荡速率，默认 50.0
    pub hit_shake_rate: f32,

    // ========== 脚步贴地 ==========
    /// 脚相对身体的侧向偏移，默认 0.3
    pub foot_lateral_offset: f32,
    /// 射线起点高于身体的高度，默认 1.0
    pub foot_ray_height: f32,
    /// 射线最大长度，默认 10.0
    pub foot_ray_length: f32,
    /// 地面间隙（加到 IK 目标高度上），默认 0.0
    pub foot_clearance: f32,
    /// 步态相位速率 (rad/s)，默认 3.0
    pub foot_step_rate: f32,
    /// 极向量点在身体前方的距离，默认 2.0
    pub pole_forward_distance: f32,
    /// 新腿的步幅，默认 1.0
    pub default_stride: f32,
    /// 新腿的重新落脚距离，默认 0.3
    pub default_step_threshold: f32,

    // ========== 游动 ==========
    /// 触手波动频率，默认 2.0
    pub swim_frequency: f32,
    /// 触手波动幅度，默认 0.5
    pub swim_amplitude: f32,
    /// 鳍拍动频率，默认 3.0
    pub fin_frequency: f32,
    /// 鳍拍动幅度，默认 0.3
    pub fin_amplitude: f32,
    /// 归一化游速的最大速度，默认 10.0
    pub max_swim_speed: f32,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            // ====== IK 求解 ======
            // 迭代上限很小，FABRIK 通常 3~5 次即收敛
            ik_iterations: 10,
            ik_threshold: 0.01,
            two_bone_reach_clamp: 0.999,
            default_upper_length: 0.5,
            default_lower_length: 0.5,

            // ====== CCD ======
            ccd_damping: 0.5,
            ccd_slerp: 0.3,

            // ====== 程序化动画 ======
            walk_speed: 5.0,
            idle_rate: 2.0,
            bob_amount: 0.1,
            sway_amount: 0.05,
            head_nod: 0.1,
            arm_swing: 0.5,
            leg_swing: 0.4,
            attack_swing: 1.5,
            attack_roll: 0.3,
            attack_twist: 0.3,
            hit_decay: 5.0,
            hit_shake_rate: 50.0,

            // ====== 脚步贴地 ======
            foot_lateral_offset: 0.3,
            foot_ray_height: 1.0,
            foot_ray_length: 10.0,
            foot_clearance: 0.0,
            foot_step_rate: 3.0,
            pole_forward_distance: 2.0,
            default_stride: 1.0,
            default_step_threshold: 0.3,

            // ====== 游动 ======
            swim_frequency: 2.0,
            swim_amplitude: 0.5,
            fin_frequency: 3.0,
            fin_amplitude: 0.3,
            max_swim_speed: 10.0,
        }
    }
}

impl RigConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.ik_iterations == 0 {
            return Err(RigError::InvalidConfig("ik_iterations must be at least 1".into()));
        }
        if !(self.ik_threshold > 0.0) {
            return Err(RigError::InvalidConfig("ik_threshold must be positive".into()));
        }
        if !(self.two_bone_reach_clamp > 0.0 && self.two_bone_reach_clamp <= 1.0) {
            return Err(RigError::InvalidConfig(
                "two_bone_reach_clamp must be in (0, 1]".into(),
            ));
        }
        if !(self.default_upper_length > 0.0 && self.default_lower_length > 0.0) {
            return Err(RigError::InvalidConfig("default bone lengths must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.ccd_damping) || !(0.0..=1.0).contains(&self.ccd_slerp) {
            return Err(RigError::InvalidConfig("ccd_damping and ccd_slerp must be in [0, 1]".into()));
        }
        if !(self.foot_ray_length > 0.0) {
            return Err(RigError::InvalidConfig("foot_ray_length must be positive".into()));
        }
        if self.default_step_threshold < 0.0 {
            return Err(RigError::InvalidConfig("default_step_threshold must not be negative".into()));
        }
        if !(self.max_swim_speed > 0.0) {
            return Err(RigError::InvalidConfig("max_swim_speed must be positive".into()));
        }

        let rates = [
            ("walk_speed", self.walk_speed),
            ("idle_rate", self.idle_rate),
            ("hit_decay", self.hit_decay),
            ("hit_shake_rate", self.hit_shake_rate),
            ("foot_step_rate", self.foot_step_rate),
            ("swim_frequency", self.swim_frequency),
            ("fin_frequency", self.fin_frequency),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(RigError::InvalidConfig(format!("{} must be finite and >= 0", name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RigConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let config = RigConfig {
            ik_iterations: 0,
            ..RigConfig::default()
        };
        assert!(matches!(config.validate(), Err(RigError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_reach_clamp_above_one() {
        let config = RigConfig {
            two_bone_reach_clamp: 1.5,
            ..RigConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nan_rate() {
        let config = RigConfig {
            walk_speed: f32::NAN,
            ..RigConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

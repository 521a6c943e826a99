//! 骨骼演示：双足生物走过 rapier 台阶地形，触手追踪一个绕圈的目标
//!
//! 运行：`RUST_LOG=info cargo run --features demo --bin rig_demo`

use std::f32::consts::PI;

use creature_rig::animator::{BoneMapping, ProceduralAnimator};
use creature_rig::foot::{ColliderTerrain, FootPlacement, LegBinding};
use creature_rig::ik::{FabrikChain, TwoBoneIk};
use creature_rig::rig::{CreatureRig, RigInput};
use creature_rig::skeleton::{BoneSet, SceneGraph};
use creature_rig::{RigConfig, RigError};
use glam::{Quat, Vec3};
use rapier3d::geometry::{ColliderBuilder, ColliderSet};
use rapier3d::na::Vector3;

fn build_skeleton() -> Result<BoneSet, RigError> {
    let mut set = BoneSet::new();
    let body = set.add_bone("Hips", None, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY)?;
    set.add_bone("Head", Some(body), Vec3::new(0.0, 0.6, 0.0), Quat::IDENTITY)?;
    for (side, x) in [("L", -0.3f32), ("R", 0.3)] {
        let hip = set.add_bone(&format!("Thigh.{}", side), Some(body), Vec3::new(x, 0.0, 0.0), Quat::IDENTITY)?;
        let knee = set.add_bone(&format!("Shin.{}", side), Some(hip), Vec3::new(0.0, -0.5, 0.0), Quat::IDENTITY)?;
        set.add_bone(&format!("Foot.{}", side), Some(knee), Vec3::new(0.0, -0.5, 0.0), Quat::IDENTITY)?;
    }
    let mut parent = body;
    for i in 0..5 {
        let offset = if i == 0 { Vec3::new(0.0, 0.3, 0.2) } else { Vec3::new(0.0, 0.0, 0.25) };
        parent = set.add_bone(&format!("Tentacle{}", i), Some(parent), offset, Quat::IDENTITY)?;
    }
    Ok(set)
}

fn build_terrain() -> ColliderTerrain {
    let mut colliders = ColliderSet::new();
    colliders.insert(
        ColliderBuilder::cuboid(20.0, 0.5, 20.0)
            .translation(Vector3::new(0.0, -0.5, 0.0))
            .build(),
    );
    // 前方的台阶
    colliders.insert(
        ColliderBuilder::cuboid(2.0, 0.1, 1.0)
            .translation(Vector3::new(0.0, 0.1, 3.0))
            .build(),
    );
    ColliderTerrain::new(colliders)
}

fn run() -> Result<(), RigError> {
    let config = RigConfig::default();
    let set = build_skeleton()?;
    let mapping = BoneMapping::auto_detect(&set);

    let mut rig = CreatureRig::new(set, &config)?;
    let hips = rig
        .scene()
        .find_bone_by_name("Hips")
        .ok_or_else(|| RigError::BoneNotFound("Hips".into()))?;
    rig.set_root_bone(hips)?;

    let mut feet = FootPlacement::new(&config)?;
    for (i, side) in ["L", "R"].into_iter().enumerate() {
        let scene = rig.scene();
        let find = |name: String| scene.find_bone_by_name(&name).ok_or(RigError::BoneNotFound(name));
        let ik = TwoBoneIk::new(
            scene,
            find(format!("Thigh.{}", side))?,
            find(format!("Shin.{}", side))?,
            find(format!("Foot.{}", side))?,
            &config,
        )?;
        // 步幅小于腿长，身体前进时脚仍够得到目标
        feet.add_binding(LegBinding::new(ik, i as f32 * PI, &config).with_stride(0.3));
    }
    rig.set_feet(feet);
    rig.set_animator(ProceduralAnimator::new(mapping, &config)?);

    let tip = rig
        .scene()
        .find_bone_by_name("Tentacle4")
        .ok_or_else(|| RigError::BoneNotFound("Tentacle4".into()))?;
    let tentacle = FabrikChain::from_end_bone(rig.scene(), tip, 5, &config)?;
    let chain = rig.add_chain(tentacle);

    let speed = rig.locomotion_mut().add_constant(0.8);
    rig.locomotion_mut().set_root(speed)?;

    let terrain = build_terrain();
    let dt = 1.0 / 60.0;
    let mut body = Vec3::new(0.0, 1.0, 0.0);

    for frame in 0..240 {
        body.z += dt * 0.8;
        let t = frame as f32 * dt;
        let target = body + Vec3::new(t.cos() * 0.5, 0.6, 0.5 + t.sin() * 0.3);
        rig.set_chain_target(chain, Some(target), None)?;

        rig.tick(dt, RigInput::new(body, Vec3::Z), &terrain);

        if frame % 30 == 0 {
            if let Some(feet) = rig.feet() {
                for (i, (report, foot)) in feet.reports().zip(["Foot.L", "Foot.R"]).enumerate() {
                    let miss = rig
                        .scene()
                        .find_bone_by_name(foot)
                        .and_then(|bone| rig.scene().world_position(bone))
                        .map_or(f32::NAN, |p| p.distance(report.target));
                    log::info!(
                        "[Demo] 帧 {:3} 腿 {}: 目标 ({:.2}, {:.2}, {:.2}) 地面 {:.2} 偏差 {:.3}{}",
                        frame,
                        i,
                        report.target.x,
                        report.target.y,
                        report.target.z,
                        report.ground_y,
                        miss,
                        if report.stepping { " 落脚" } else { "" }
                    );
                }
            }
        }
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("[Demo] {}", e);
        std::process::exit(1);
    }
}

//! 地形射线查询
//!
//! 脚步系统只需要"从上往下打一条射线"，宿主可以用任意地形表示实现它。

use glam::Vec3;
use rapier3d::geometry::ColliderSet;
use rapier3d::na::{Point3, Vector3};
use rapier3d::parry::query::{Ray, RayCast};

use crate::ik::DEGENERATE_EPSILON;

/// 射线命中
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainHit {
    /// 命中点
    pub point: Vec3,
    /// 表面法线
    pub normal: Vec3,
    /// 沿射线的距离
    pub distance: f32,
}

/// 地形查询接口
pub trait TerrainQuery {
    /// `direction` 为单位向量；超过 `max_distance` 视为未命中
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<TerrainHit>;
}

impl<T: TerrainQuery + ?Sized> TerrainQuery for &T {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<TerrainHit> {
        (**self).raycast(origin, direction, max_distance)
    }
}

// ============================================================================
// 简单实现
// ============================================================================

/// 没有地形（深渊上空），射线永远不命中
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTerrain;

impl TerrainQuery for NoTerrain {
    fn raycast(&self, _origin: Vec3, _direction: Vec3, _max_distance: f32) -> Option<TerrainHit> {
        None
    }
}

/// 无限大水平地面
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlatGround {
    pub height: f32,
}

impl FlatGround {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl TerrainQuery for FlatGround {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<TerrainHit> {
        if direction.y.abs() < DEGENERATE_EPSILON {
            return None;
        }
        let distance = (self.height - origin.y) / direction.y;
        if !(0.0..=max_distance).contains(&distance) {
            return None;
        }
        Some(TerrainHit {
            point: origin + direction * distance,
            normal: Vec3::Y,
            distance,
        })
    }
}

/// 高度函数地形 `y = f(x, z)`
///
/// 只回答竖直向下的射线，其他方向一律未命中。
pub struct HeightFn<F> {
    height: F,
}

impl<F: Fn(f32, f32) -> f32> HeightFn<F> {
    pub fn new(height: F) -> Self {
        Self { height }
    }
}

impl<F: Fn(f32, f32) -> f32> TerrainQuery for HeightFn<F> {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<TerrainHit> {
        if direction.y > -0.999 {
            return None;
        }
        let ground = (self.height)(origin.x, origin.z);
        let distance = origin.y - ground;
        if !ground.is_finite() || !(0.0..=max_distance).contains(&distance) {
            return None;
        }
        Some(TerrainHit {
            point: Vec3::new(origin.x, ground, origin.z),
            normal: Vec3::Y,
            distance,
        })
    }
}

impl<F> std::fmt::Debug for HeightFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeightFn").finish_non_exhaustive()
    }
}

// ============================================================================
// rapier 碰撞体地形
// ============================================================================

/// 由 rapier 碰撞体组成的地形，取所有形状中最近的命中
#[derive(Default)]
pub struct ColliderTerrain {
    colliders: ColliderSet,
}

impl ColliderTerrain {
    pub fn new(colliders: ColliderSet) -> Self {
        Self { colliders }
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn colliders_mut(&mut self) -> &mut ColliderSet {
        &mut self.colliders
    }
}

impl TerrainQuery for ColliderTerrain {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<TerrainHit> {
        let ray = Ray::new(
            Point3::new(origin.x, origin.y, origin.z),
            Vector3::new(direction.x, direction.y, direction.z),
        );

        let mut nearest: Option<TerrainHit> = None;
        for (_, collider) in self.colliders.iter() {
            let Some(hit) = collider
                .shape()
                .cast_ray_and_get_normal(collider.position(), &ray, max_distance, true)
            else {
                continue;
            };
            if nearest.map_or(true, |n| hit.time_of_impact < n.distance) {
                let point = ray.point_at(hit.time_of_impact);
                nearest = Some(TerrainHit {
                    point: Vec3::new(point.x, point.y, point.z),
                    normal: Vec3::new(hit.normal.x, hit.normal.y, hit.normal.z),
                    distance: hit.time_of_impact,
                });
            }
        }
        nearest
    }
}

impl std::fmt::Debug for ColliderTerrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColliderTerrain")
            .field("colliders", &self.colliders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::geometry::ColliderBuilder;

    #[test]
    fn test_flat_ground() {
        let ground = FlatGround::new(0.5);
        let hit = ground.raycast(Vec3::new(1.0, 2.0, 3.0), Vec3::NEG_Y, 10.0).unwrap();
        assert!((hit.point - Vec3::new(1.0, 0.5, 3.0)).length() < 1e-6);
        assert!((hit.distance - 1.5).abs() < 1e-6);
        // 地面在射线起点之上
        assert!(ground.raycast(Vec3::ZERO, Vec3::NEG_Y, 10.0).is_none());
        // 超出最大长度
        assert!(ground.raycast(Vec3::new(0.0, 20.0, 0.0), Vec3::NEG_Y, 10.0).is_none());
    }

    #[test]
    fn test_height_fn() {
        let hills = HeightFn::new(|x: f32, z: f32| x * 0.5 + z * 0.25);
        let hit = hills.raycast(Vec3::new(2.0, 5.0, 4.0), Vec3::NEG_Y, 10.0).unwrap();
        assert!((hit.point.y - 2.0).abs() < 1e-6);
        assert!(hills.raycast(Vec3::new(2.0, 5.0, 4.0), Vec3::X, 10.0).is_none());
    }

    #[test]
    fn test_no_terrain() {
        assert!(NoTerrain.raycast(Vec3::ZERO, Vec3::NEG_Y, 100.0).is_none());
    }

    #[test]
    fn test_collider_terrain_nearest_hit() {
        let mut colliders = ColliderSet::new();
        colliders.insert(
            ColliderBuilder::cuboid(5.0, 0.5, 5.0)
                .translation(Vector3::new(0.0, -0.5, 0.0))
                .build(),
        );
        // 地面上方的平台
        colliders.insert(
            ColliderBuilder::cuboid(1.0, 0.25, 1.0)
                .translation(Vector3::new(2.0, 0.25, 0.0))
                .build(),
        );
        let terrain = ColliderTerrain::new(colliders);

        let ground = terrain.raycast(Vec3::new(-2.0, 3.0, 0.0), Vec3::NEG_Y, 10.0).unwrap();
        assert!(ground.point.y.abs() < 1e-4);
        assert!((ground.normal - Vec3::Y).length() < 1e-4);

        let step = terrain.raycast(Vec3::new(2.0, 3.0, 0.0), Vec3::NEG_Y, 10.0).unwrap();
        assert!((step.point.y - 0.5).abs() < 1e-4);

        assert!(terrain.raycast(Vec3::new(20.0, 3.0, 0.0), Vec3::NEG_Y, 10.0).is_none());
    }
}

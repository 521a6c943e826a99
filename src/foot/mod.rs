//! 脚步贴地系统
//!
//! 地形射线 + 双骨骼 IK，让腿适应不平的地面。

mod placement;
mod terrain;

pub use placement::{FootPlacement, FootReport, LegBinding};
pub use terrain::{ColliderTerrain, FlatGround, HeightFn, NoTerrain, TerrainHit, TerrainQuery};

//! 混合树节点竞技场
//!
//! 节点按添加顺序编号，子节点必须先于父节点存在，
//! 因此树中不可能出现环，递归求值一定终止。

use std::fmt;
use std::sync::Arc;

use glam::Vec2;

use crate::{Result, RigError};

use super::Blendable;

/// 方向节点最多的源数量
const MAX_DIRECTIONAL_SOURCES: usize = 4;

/// 按时间采样的叶节点函数
pub type SampleFn<T> = Arc<dyn Fn(f32) -> T + Send + Sync>;

/// 叶节点数据源
pub enum LeafSource<T> {
    /// 常量
    Constant(T),
    /// 按时间采样（动画片段 / 曲线）
    Sampled(SampleFn<T>),
}

impl<T: Clone> LeafSource<T> {
    #[inline]
    pub fn sample(&self, t: f32) -> T {
        match self {
            LeafSource::Constant(value) => value.clone(),
            LeafSource::Sampled(f) => f(t),
        }
    }
}

impl<T: Clone> Clone for LeafSource<T> {
    fn clone(&self) -> Self {
        match self {
            LeafSource::Constant(value) => LeafSource::Constant(value.clone()),
            LeafSource::Sampled(f) => LeafSource::Sampled(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LeafSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafSource::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            LeafSource::Sampled(_) => f.write_str("Sampled(..)"),
        }
    }
}

/// 方向节点的混合方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DirectionalMode {
    /// 按象限选一个源，不做插值
    #[default]
    Quadrant,
    /// 四个源双线性插值
    Bilinear,
}

/// 混合节点
#[derive(Clone, Debug)]
pub enum BlendNode<T> {
    Leaf(LeafSource<T>),
    /// `a + b * weight`
    Additive { a: usize, b: usize, weight: f32 },
    /// 源顺序：(-x,-y), (+x,-y), (-x,+y), (+x,+y)
    Directional {
        sources: Vec<usize>,
        direction: Vec2,
        mode: DirectionalMode,
    },
}

impl<T> BlendNode<T> {
    /// 子节点
    pub fn children(&self) -> Vec<usize> {
        match self {
            BlendNode::Leaf(_) => Vec::new(),
            BlendNode::Additive { a, b, .. } => vec![*a, *b],
            BlendNode::Directional { sources, .. } => sources.clone(),
        }
    }
}

/// 方向 → 象限源下标
///
/// 两个分量先钳制到 [-1, 1]；只有严格大于 0 才算正半轴，
/// 缺失的源回退到 0 号。
pub fn selected_index(direction: Vec2, source_count: usize) -> usize {
    let x = direction.x.clamp(-1.0, 1.0);
    let y = direction.y.clamp(-1.0, 1.0);
    let index = usize::from(y > 0.0) * 2 + usize::from(x > 0.0);
    if index < source_count {
        index
    } else {
        0
    }
}

// ============================================================================
// 混合树
// ============================================================================

/// 混合树
#[derive(Clone, Debug)]
pub struct BlendTree<T> {
    nodes: Vec<BlendNode<T>>,
    root: Option<usize>,
}

impl<T> Default for BlendTree<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }
}

impl<T: Blendable> BlendTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: usize) -> Option<&BlendNode<T>> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    // ========================================
    // 构建
    // ========================================

    /// 添加叶节点
    pub fn add_leaf(&mut self, source: LeafSource<T>) -> usize {
        self.push(BlendNode::Leaf(source))
    }

    /// 添加常量叶节点
    pub fn add_constant(&mut self, value: T) -> usize {
        self.add_leaf(LeafSource::Constant(value))
    }

    /// 添加按时间采样的叶节点
    pub fn add_sampled<F>(&mut self, f: F) -> usize
    where
        F: Fn(f32) -> T + Send + Sync + 'static,
    {
        self.add_leaf(LeafSource::Sampled(Arc::new(f)))
    }

    /// 添加叠加节点
    pub fn add_additive(&mut self, a: usize, b: usize, weight: f32) -> Result<usize> {
        self.check_node(a)?;
        self.check_node(b)?;
        Ok(self.push(BlendNode::Additive { a, b, weight }))
    }

    /// 添加方向节点（1~4 个源）
    pub fn add_directional(&mut self, sources: &[usize], direction: Vec2, mode: DirectionalMode) -> Result<usize> {
        if sources.is_empty() || sources.len() > MAX_DIRECTIONAL_SOURCES {
            return Err(RigError::InvalidConfig(format!(
                "directional node takes 1 to {} sources, got {}",
                MAX_DIRECTIONAL_SOURCES,
                sources.len()
            )));
        }
        for &source in sources {
            self.check_node(source)?;
        }
        Ok(self.push(BlendNode::Directional {
            sources: sources.to_vec(),
            direction,
            mode,
        }))
    }

    /// 设置根节点
    pub fn set_root(&mut self, node: usize) -> Result<()> {
        self.check_node(node)?;
        log::debug!("[Blend] 根节点 #{}，共 {} 个节点", node, self.nodes.len());
        self.root = Some(node);
        Ok(())
    }

    // ========================================
    // 每帧输入
    // ========================================

    /// 更新方向节点的输入方向
    pub fn set_direction(&mut self, node: usize, dir: Vec2) -> Result<()> {
        match self.nodes.get_mut(node) {
            Some(BlendNode::Directional { direction, .. }) => {
                *direction = dir;
                Ok(())
            }
            Some(_) => Err(RigError::InvalidConfig(format!("blend node {} is not directional", node))),
            None => Err(RigError::UnknownBlendNode(node)),
        }
    }

    /// 更新叠加节点的权重
    pub fn set_weight(&mut self, node: usize, value: f32) -> Result<()> {
        match self.nodes.get_mut(node) {
            Some(BlendNode::Additive { weight, .. }) => {
                *weight = value;
                Ok(())
            }
            Some(_) => Err(RigError::InvalidConfig(format!("blend node {} is not additive", node))),
            None => Err(RigError::UnknownBlendNode(node)),
        }
    }

    // ========================================
    // 求值
    // ========================================

    /// 从根节点求值，空树返回 `neutral()`
    ///
    /// 不修改任何状态，同一帧可重复调用。
    pub fn evaluate(&self, t: f32) -> T {
        match self.root {
            Some(root) => self.eval(root, t),
            None => T::neutral(),
        }
    }

    /// 对任意节点求值
    pub fn evaluate_node(&self, node: usize, t: f32) -> Result<T> {
        self.check_node(node)?;
        Ok(self.eval(node, t))
    }

    fn eval(&self, node: usize, t: f32) -> T {
        let Some(node) = self.nodes.get(node) else {
            return T::neutral();
        };
        match node {
            BlendNode::Leaf(source) => source.sample(t),
            BlendNode::Additive { a, b, weight } => self.eval(*a, t).add_weighted(&self.eval(*b, t), *weight),
            BlendNode::Directional { sources, direction, mode } => match mode {
                DirectionalMode::Quadrant => self.eval(sources[selected_index(*direction, sources.len())], t),
                DirectionalMode::Bilinear => self.eval_bilinear(sources, *direction, t),
            },
        }
    }

    /// 四角双线性插值，缺失的角用 0 号源
    fn eval_bilinear(&self, sources: &[usize], direction: Vec2, t: f32) -> T {
        let u = (direction.x.clamp(-1.0, 1.0) + 1.0) * 0.5;
        let v = (direction.y.clamp(-1.0, 1.0) + 1.0) * 0.5;
        let corner = |i: usize| self.eval(*sources.get(i).unwrap_or(&sources[0]), t);

        let bottom = corner(0).lerp(&corner(1), u);
        let top = corner(2).lerp(&corner(3), u);
        bottom.lerp(&top, v)
    }

    fn push(&mut self, node: BlendNode<T>) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn check_node(&self, node: usize) -> Result<()> {
        if node < self.nodes.len() {
            Ok(())
        } else {
            Err(RigError::UnknownBlendNode(node))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_tree() -> (BlendTree<f32>, usize) {
        let mut tree = BlendTree::new();
        let sources: Vec<usize> = (0..4).map(|i| tree.add_constant(i as f32 * 10.0)).collect();
        let dir = tree
            .add_directional(&sources, Vec2::ZERO, DirectionalMode::Quadrant)
            .unwrap();
        tree.set_root(dir).unwrap();
        (tree, dir)
    }

    #[test]
    fn test_empty_tree_is_neutral() {
        let tree: BlendTree<f32> = BlendTree::new();
        assert_eq!(tree.evaluate(1.0), 0.0);
    }

    #[test]
    fn test_additive() {
        let mut tree = BlendTree::new();
        let walk = tree.add_constant(1.0f32);
        let lean = tree.add_constant(2.0f32);
        let add = tree.add_additive(walk, lean, 0.5).unwrap();
        tree.set_root(add).unwrap();
        assert_eq!(tree.evaluate(0.0), 2.0);

        tree.set_weight(add, 1.0).unwrap();
        assert_eq!(tree.evaluate(0.0), 3.0);
    }

    #[test]
    fn test_sampled_leaf() {
        let mut tree = BlendTree::new();
        let ramp = tree.add_sampled(|t| t * 2.0);
        tree.set_root(ramp).unwrap();
        assert_eq!(tree.evaluate(1.5), 3.0);
    }

    #[test]
    fn test_quadrant_selection() {
        let (mut tree, dir) = quad_tree();
        for (d, expected) in [
            (Vec2::new(-0.5, -0.5), 0.0),
            (Vec2::new(0.5, -0.5), 10.0),
            (Vec2::new(-0.5, 0.5), 20.0),
            (Vec2::new(0.5, 0.5), 30.0),
            (Vec2::new(5.0, 5.0), 30.0),
        ] {
            tree.set_direction(dir, d).unwrap();
            assert_eq!(tree.evaluate(0.0), expected);
        }
    }

    #[test]
    fn test_crossing_one_axis_flips_one_bit() {
        let eps = 1e-6;
        let below = selected_index(Vec2::new(-eps, 0.5), 4);
        let above = selected_index(Vec2::new(eps, 0.5), 4);
        assert_eq!(below ^ above, 1);

        let below = selected_index(Vec2::new(0.5, -eps), 4);
        let above = selected_index(Vec2::new(0.5, eps), 4);
        assert_eq!(below ^ above, 2);

        // 恰好为 0 算负半轴
        assert_eq!(selected_index(Vec2::ZERO, 4), 0);
    }

    #[test]
    fn test_evaluate_is_pure() {
        let (mut tree, dir) = quad_tree();
        tree.set_direction(dir, Vec2::new(0.3, -0.8)).unwrap();
        let first = tree.evaluate(0.5);
        let second = tree.evaluate(0.5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_source_falls_back() {
        let mut tree = BlendTree::new();
        let a = tree.add_constant(7.0f32);
        let b = tree.add_constant(9.0f32);
        let dir = tree
            .add_directional(&[a, b], Vec2::new(0.5, 0.5), DirectionalMode::Quadrant)
            .unwrap();
        tree.set_root(dir).unwrap();
        assert_eq!(tree.evaluate(0.0), 7.0);
    }

    #[test]
    fn test_bilinear() {
        let mut tree = BlendTree::new();
        let sources: Vec<usize> = (0..4).map(|i| tree.add_constant(i as f32 * 10.0)).collect();
        let dir = tree
            .add_directional(&sources, Vec2::ZERO, DirectionalMode::Bilinear)
            .unwrap();
        tree.set_root(dir).unwrap();
        assert!((tree.evaluate(0.0) - 15.0).abs() < 1e-5);

        tree.set_direction(dir, Vec2::new(1.0, 1.0)).unwrap();
        assert!((tree.evaluate(0.0) - 30.0).abs() < 1e-5);
    }

    #[test]
    fn test_children_must_exist() {
        let mut tree: BlendTree<f32> = BlendTree::new();
        let a = tree.add_constant(1.0);
        assert!(matches!(tree.add_additive(a, 5, 0.5), Err(RigError::UnknownBlendNode(5))));
        assert!(tree.add_directional(&[], Vec2::ZERO, DirectionalMode::Quadrant).is_err());
        assert!(matches!(tree.set_root(3), Err(RigError::UnknownBlendNode(3))));
        assert!(tree.set_direction(a, Vec2::X).is_err());
    }

    #[test]
    fn test_leaf_has_no_children() {
        let mut tree = BlendTree::new();
        let a = tree.add_constant(1.0f32);
        let b = tree.add_constant(2.0f32);
        let add = tree.add_additive(a, b, 1.0).unwrap();
        assert!(tree.node(a).unwrap().children().is_empty());
        assert_eq!(tree.node(add).unwrap().children(), vec![a, b]);
    }
}

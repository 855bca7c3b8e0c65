//! Ordered view over a channel strip's fixed node set, with named presets.
//!
//! The strip never gains or loses processing nodes. The chain only records the order the nodes
//! are shown in, which preset (if any) produced that order, and per-node bypass flags. Bypass
//! flags are published to the strip as a bit mask.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::audio_engine::errors::EngineError;

/// Processing nodes of a channel strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EffectNode {
    Eq,
    Filter,
    Delay,
    Reverb,
    Flanger,
    Phaser,
}

/// Node category, as shown next to the node name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Eq,
    Filter,
    Effect,
    Beat,
}

impl EffectNode {
    pub const ALL: [EffectNode; 6] = [
        EffectNode::Eq,
        EffectNode::Filter,
        EffectNode::Delay,
        EffectNode::Reverb,
        EffectNode::Flanger,
        EffectNode::Phaser,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectNode::Eq => "EQ",
            EffectNode::Filter => "Filter",
            EffectNode::Delay => "Delay",
            EffectNode::Reverb => "Reverb",
            EffectNode::Flanger => "Flanger",
            EffectNode::Phaser => "Phaser",
        }
    }

    pub fn kind(self) -> NodeKind {
        match self {
            EffectNode::Eq => NodeKind::Eq,
            EffectNode::Filter => NodeKind::Filter,
            EffectNode::Delay | EffectNode::Reverb => NodeKind::Effect,
            EffectNode::Flanger | EffectNode::Phaser => NodeKind::Beat,
        }
    }

    /// Bit of this node in a strip bypass mask.
    #[inline]
    pub fn bit(self) -> u32 {
        let index = match self {
            EffectNode::Eq => 0,
            EffectNode::Filter => 1,
            EffectNode::Delay => 2,
            EffectNode::Reverb => 3,
            EffectNode::Flanger => 4,
            EffectNode::Phaser => 5,
        };
        1 << index
    }
}

impl fmt::Display for EffectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    pub node: EffectNode,
    pub bypassed: bool,
}

impl NodeDescriptor {
    fn active(node: EffectNode) -> Self {
        Self {
            node,
            bypassed: false,
        }
    }
}

/// Named chain orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EffectPreset {
    Clean,
    Echo,
    Space,
    Dubstep,
}

impl EffectPreset {
    pub const ALL: [EffectPreset; 4] = [
        EffectPreset::Clean,
        EffectPreset::Echo,
        EffectPreset::Space,
        EffectPreset::Dubstep,
    ];

    pub fn id(self) -> &'static str {
        match self {
            EffectPreset::Clean => "CLEAN",
            EffectPreset::Echo => "ECHO",
            EffectPreset::Space => "SPACE",
            EffectPreset::Dubstep => "DUBSTEP",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EffectPreset::Clean => "Clean",
            EffectPreset::Echo => "Echo",
            EffectPreset::Space => "Space",
            EffectPreset::Dubstep => "Dubstep",
        }
    }

    pub fn nodes(self) -> &'static [EffectNode] {
        match self {
            EffectPreset::Clean => &[],
            EffectPreset::Echo => &[EffectNode::Delay],
            EffectPreset::Space => &[EffectNode::Reverb],
            EffectPreset::Dubstep => &[EffectNode::Filter, EffectNode::Phaser],
        }
    }
}

impl FromStr for EffectPreset {
    type Err = EngineError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        EffectPreset::ALL
            .into_iter()
            .find(|preset| preset.id().eq_ignore_ascii_case(id))
            .ok_or_else(|| EngineError::UnknownPreset(id.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainMode {
    Preset(EffectPreset),
    Custom,
}

impl fmt::Display for ChainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainMode::Preset(preset) => f.write_str(preset.id()),
            ChainMode::Custom => f.write_str("custom"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectChain {
    nodes: Vec<NodeDescriptor>,
    mode: ChainMode,
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::from_preset(EffectPreset::Clean)
    }
}

impl EffectChain {
    pub fn from_preset(preset: EffectPreset) -> Self {
        Self {
            nodes: preset.nodes().iter().copied().map(NodeDescriptor::active).collect(),
            mode: ChainMode::Preset(preset),
        }
    }

    /// Node order as displayed.
    pub fn get_nodes(&self) -> Vec<EffectNode> {
        self.nodes.iter().map(|descriptor| descriptor.node).collect()
    }

    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    pub fn mode(&self) -> ChainMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<(), EngineError> {
        if index >= self.nodes.len() {
            return Err(EngineError::InvalidParameter(format!(
                "chain index {index} out of range (chain has {} nodes)",
                self.nodes.len()
            )));
        }
        Ok(())
    }

    /// Moves the entry at `from` to `to`, keeping the relative order of the rest.
    pub fn move_node(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        self.check_index(from)?;
        self.check_index(to)?;

        let descriptor = self.nodes.remove(from);
        self.nodes.insert(to, descriptor);
        self.mode = ChainMode::Custom;
        Ok(())
    }

    /// Replaces the order with a named preset. Unknown ids leave the chain untouched.
    pub fn apply_preset(&mut self, id: &str) -> Result<EffectPreset, EngineError> {
        let preset = id.parse::<EffectPreset>()?;
        *self = Self::from_preset(preset);
        Ok(preset)
    }

    pub fn insert_node(&mut self, index: usize, node: EffectNode) -> Result<(), EngineError> {
        if self.position(node).is_some() {
            return Err(EngineError::InvalidParameter(format!(
                "{node} is already in the chain"
            )));
        }
        if index > self.nodes.len() {
            return Err(EngineError::InvalidParameter(format!(
                "chain index {index} out of range (chain has {} nodes)",
                self.nodes.len()
            )));
        }

        self.nodes.insert(index, NodeDescriptor::active(node));
        self.mode = ChainMode::Custom;
        Ok(())
    }

    pub fn remove_node(&mut self, index: usize) -> Result<EffectNode, EngineError> {
        self.check_index(index)?;

        let descriptor = self.nodes.remove(index);
        self.mode = ChainMode::Custom;
        Ok(descriptor.node)
    }

    /// Sets the bypass flag of a node in the chain. Does not change the mode.
    pub fn set_bypass(&mut self, node: EffectNode, bypassed: bool) -> Result<(), EngineError> {
        let index = self.position(node).ok_or_else(|| {
            EngineError::InvalidParameter(format!("{node} is not in the chain"))
        })?;
        self.nodes[index].bypassed = bypassed;
        Ok(())
    }

    pub fn position(&self, node: EffectNode) -> Option<usize> {
        self.nodes.iter().position(|descriptor| descriptor.node == node)
    }

    /// Bits of every bypassed node.
    pub fn bypass_mask(&self) -> u32 {
        self.nodes
            .iter()
            .filter(|descriptor| descriptor.bypassed)
            .fold(0, |mask, descriptor| mask | descriptor.node.bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_clean() {
        let chain = EffectChain::default();
        assert!(chain.is_empty());
        assert_eq!(chain.mode(), ChainMode::Preset(EffectPreset::Clean));
    }

    #[test]
    fn test_apply_dubstep_preset() {
        let mut chain = EffectChain::default();
        chain.apply_preset("DUBSTEP").unwrap();

        assert_eq!(chain.get_nodes(), vec![EffectNode::Filter, EffectNode::Phaser]);
        assert_eq!(chain.mode(), ChainMode::Preset(EffectPreset::Dubstep));
    }

    #[test]
    fn test_move_after_preset_marks_custom() {
        let mut chain = EffectChain::default();
        chain.apply_preset("DUBSTEP").unwrap();
        chain.move_node(0, 1).unwrap();

        assert_eq!(chain.get_nodes(), vec![EffectNode::Phaser, EffectNode::Filter]);
        assert_eq!(chain.mode(), ChainMode::Custom);
        assert_eq!(chain.mode().to_string(), "custom");
    }

    #[test]
    fn test_move_preserves_rest() {
        let mut chain = EffectChain::default();
        for (i, node) in [
            EffectNode::Eq,
            EffectNode::Filter,
            EffectNode::Delay,
            EffectNode::Reverb,
        ]
        .into_iter()
        .enumerate()
        {
            chain.insert_node(i, node).unwrap();
        }

        chain.move_node(3, 0).unwrap();
        assert_eq!(
            chain.get_nodes(),
            vec![
                EffectNode::Reverb,
                EffectNode::Eq,
                EffectNode::Filter,
                EffectNode::Delay
            ]
        );
    }

    #[test]
    fn test_unknown_preset_leaves_state_unchanged() {
        let mut chain = EffectChain::default();
        chain.apply_preset("ECHO").unwrap();
        let before = chain.clone();

        let err = chain.apply_preset("WOBBLE").unwrap_err();
        assert!(matches!(err, EngineError::UnknownPreset(ref id) if id == "WOBBLE"));
        assert_eq!(chain, before);
    }

    #[test]
    fn test_out_of_range_move_leaves_state_unchanged() {
        let mut chain = EffectChain::from_preset(EffectPreset::Dubstep);
        assert!(chain.move_node(0, 2).is_err());
        assert!(chain.move_node(5, 0).is_err());
        assert_eq!(chain.mode(), ChainMode::Preset(EffectPreset::Dubstep));
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut chain = EffectChain::from_preset(EffectPreset::Space);
        assert!(chain.insert_node(0, EffectNode::Reverb).is_err());
        assert_eq!(chain.mode(), ChainMode::Preset(EffectPreset::Space));
    }

    #[test]
    fn test_remove_node() {
        let mut chain = EffectChain::from_preset(EffectPreset::Dubstep);
        assert_eq!(chain.remove_node(0).unwrap(), EffectNode::Filter);
        assert_eq!(chain.get_nodes(), vec![EffectNode::Phaser]);
        assert_eq!(chain.mode(), ChainMode::Custom);
    }

    #[test]
    fn test_bypass_mask() {
        let mut chain = EffectChain::from_preset(EffectPreset::Dubstep);
        assert_eq!(chain.bypass_mask(), 0);

        chain.set_bypass(EffectNode::Phaser, true).unwrap();
        assert_eq!(chain.bypass_mask(), EffectNode::Phaser.bit());
        assert_eq!(chain.mode(), ChainMode::Preset(EffectPreset::Dubstep));

        assert!(chain.set_bypass(EffectNode::Delay, true).is_err());
    }

    #[test]
    fn test_preset_ids_parse_case_insensitively() {
        assert_eq!("space".parse::<EffectPreset>().unwrap(), EffectPreset::Space);
        assert_eq!("CLEAN".parse::<EffectPreset>().unwrap(), EffectPreset::Clean);
    }

    #[test]
    fn test_node_kinds() {
        assert_eq!(EffectNode::Eq.kind(), NodeKind::Eq);
        assert_eq!(EffectNode::Reverb.kind(), NodeKind::Effect);
        assert_eq!(EffectNode::Flanger.kind(), NodeKind::Beat);
    }
}

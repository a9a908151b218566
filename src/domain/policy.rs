// ============================================================
// Layer 3 — Layer Quantization Policy
// ============================================================
// Quantization-aware training simulates low-precision
// arithmetic in every layer except a few the deployment
// runtime cannot quantize (pixel shuffles, raw tensor adds).
// Instead of matching on layer names at runtime, the network
// builder receives this map and resolves each named layer once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerPolicy {
    /// Simulate quantized weights and activations
    Quantize,
    /// Leave the layer in full precision
    Passthrough,
}

/// Per-layer policy with a fallback for layers not listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPolicyMap {
    default:   LayerPolicy,
    overrides: BTreeMap<String, LayerPolicy>,
}

impl LayerPolicyMap {
    /// Every layer full precision — plain training.
    pub fn full_precision() -> Self {
        Self { default: LayerPolicy::Passthrough, overrides: BTreeMap::new() }
    }

    /// Quantize everything except the named layers.
    pub fn quantize_except<I, S>(passthrough: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let overrides = passthrough
            .into_iter()
            .map(|name| (name.into(), LayerPolicy::Passthrough))
            .collect();
        Self { default: LayerPolicy::Quantize, overrides }
    }

    /// Set the policy of one layer, replacing any previous entry.
    pub fn with(mut self, name: impl Into<String>, policy: LayerPolicy) -> Self {
        self.overrides.insert(name.into(), policy);
        self
    }

    pub fn resolve(&self, layer: &str) -> LayerPolicy {
        self.overrides.get(layer).copied().unwrap_or(self.default)
    }

    /// True when at least one layer would be quantized.
    pub fn is_quantized(&self) -> bool {
        self.default == LayerPolicy::Quantize
            || self.overrides.values().any(|p| *p == LayerPolicy::Quantize)
    }
}

impl Default for LayerPolicyMap {
    fn default() -> Self {
        Self::full_precision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_precision_resolves_everything_to_passthrough() {
        let map = LayerPolicyMap::full_precision();
        assert_eq!(map.resolve("conv_first"), LayerPolicy::Passthrough);
        assert!(!map.is_quantized());
    }

    #[test]
    fn test_quantize_except_keeps_listed_layers() {
        let map = LayerPolicyMap::quantize_except(["depth_to_space"]);
        assert_eq!(map.resolve("depth_to_space"), LayerPolicy::Passthrough);
        assert_eq!(map.resolve("body.0"), LayerPolicy::Quantize);
        assert!(map.is_quantized());
    }

    #[test]
    fn test_override_replaces_entry() {
        let map = LayerPolicyMap::quantize_except(["anchor"])
            .with("anchor", LayerPolicy::Quantize);
        assert_eq!(map.resolve("anchor"), LayerPolicy::Quantize);
    }
}

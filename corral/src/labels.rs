use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A label map as the daemon understands it: key to value, byte-wise equality.
///
/// Keys are kept verbatim. Malformed keys are the daemon's problem to reject.
pub type Labels = BTreeMap<String, String>;

/// Left-to-right merge of label maps: later maps win on key collisions.
#[must_use]
pub fn merged(maps: &[&Labels]) -> Labels {
    let mut out = Labels::new();
    for map in maps {
        for (k, v) in map.iter() {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

/// Per-resource-type label defaults, merged into everything the engine creates.
///
/// Materialization for a resource type is `merged(default, <type>, extras...)`,
/// extras last so call sites win. The managed label is re-asserted on top of
/// whatever this produces (see [`crate::engine::Engine`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct LabelConfig {
    pub default: Labels,
    pub container: Labels,
    pub volume: Labels,
    pub network: Labels,
    pub image: Labels,
}

impl LabelConfig {
    #[must_use]
    pub fn container_labels(&self, extras: &[&Labels]) -> Labels {
        self.resource_labels(&self.container, extras)
    }

    #[must_use]
    pub fn volume_labels(&self, extras: &[&Labels]) -> Labels {
        self.resource_labels(&self.volume, extras)
    }

    #[must_use]
    pub fn network_labels(&self, extras: &[&Labels]) -> Labels {
        self.resource_labels(&self.network, extras)
    }

    #[must_use]
    pub fn image_labels(&self, extras: &[&Labels]) -> Labels {
        self.resource_labels(&self.image, extras)
    }

    fn resource_labels(&self, specific: &Labels, extras: &[&Labels]) -> Labels {
        let mut maps: Vec<&Labels> = Vec::with_capacity(2 + extras.len());
        maps.push(&self.default);
        maps.push(specific);
        maps.extend_from_slice(extras);
        merged(&maps)
    }
}

#[must_use]
pub(crate) fn to_daemon(labels: &Labels) -> std::collections::HashMap<String, String> {
    labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[must_use]
pub(crate) fn from_daemon(labels: &std::collections::HashMap<String, String>) -> Labels {
    labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

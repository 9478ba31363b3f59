use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A frame the operator must extract from the previous clip before this
/// scene can be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRequirement {
    pub path: PathBuf,
    #[serde(default)]
    pub instructions: String,
}

/// One clip to generate. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSpec {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(deserialize_with = "de_seconds")]
    pub seconds: u32,
    pub size: String,
    pub prompt: String,
    #[serde(default)]
    pub reference: Option<ReferenceRequirement>,
    /// Names of earlier scenes this one continues from. Carried for the
    /// operator only; never sent to the service.
    #[serde(default)]
    pub references: Vec<String>,
}

impl SceneSpec {
    pub fn output_file_name(&self) -> String {
        format!("{}.mp4", self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneList {
    pub items: Vec<SceneSpec>,
}

#[derive(Debug, Deserialize)]
struct SceneListRoot {
    scenes: Vec<SceneSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SecondsRepr {
    Number(u32),
    Text(String),
}

fn de_seconds<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match SecondsRepr::deserialize(deserializer)? {
        SecondsRepr::Number(n) => Ok(n),
        SecondsRepr::Text(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom(format!("seconds {s:?} is not a whole number"))),
    }
}

impl SceneList {
    pub fn from_json(text: &str) -> Result<Self> {
        let root: SceneListRoot =
            serde_json::from_str(text).with_context(|| "Failed to parse scene list JSON")?;
        let list = Self { items: root.scenes };
        list.validate()?;
        Ok(list)
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read scene list: {}", path.as_ref().display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid scene list: {}", path.as_ref().display()))
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (idx, scene) in self.items.iter().enumerate() {
            let label = idx + 1;
            if scene.name.trim().is_empty() {
                anyhow::bail!("scene {}: name missing", label);
            }
            if !names.insert(scene.name.as_str()) {
                anyhow::bail!("scene {}: duplicate name {:?}", label, scene.name);
            }
            if scene.seconds == 0 {
                anyhow::bail!("scene {} ({}): seconds must be positive", label, scene.name);
            }
            if scene.prompt.trim().is_empty() {
                anyhow::bail!("scene {} ({}): prompt missing", label, scene.name);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

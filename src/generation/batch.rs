//! Batch files: scenes to generate, written by hand and queued in one go.
//!
//! ```yaml
//! session: default
//! scenes:
//!   - name: beach
//!     count: 4
//!     fast: true
//!     resolution: landscape
//!     recipe:
//!       front: "1girl, |, masterpiece"
//!       slots:
//!         - [{prompt: "<outfit.swimsuit>"}, {prompt: "<outfit.casual>"}]
//! remove_background:
//!   - scene: beach
//!     image: ./picked.png
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoomError, Result};
use crate::generation::{GenerateJob, ImageKind, ImageTask, Job, Resolution};
use crate::id::random_base_seed;
use crate::prompt::{PieceStore, PromptRecipe, compose_prompts};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneJob {
    pub name: String,
    /// Images per composed prompt
    pub count: u32,
    pub fast: bool,
    pub kind: ImageKind,
    pub resolution: Resolution,
    pub recipe: PromptRecipe,
    pub negative: String,
    pub steps: u32,
    /// Base seed; drawn at random per prompt when unset
    pub seed: Option<u32>,
    pub image: Option<PathBuf>,
    pub mask: Option<PathBuf>,
    pub strength: Option<f32>,
}

impl Default for SceneJob {
    fn default() -> Self {
        let job = GenerateJob::default();
        Self {
            name: String::new(),
            count: 1,
            fast: false,
            kind: job.kind,
            resolution: Resolution::default(),
            recipe: PromptRecipe::default(),
            negative: job.negative,
            steps: job.steps,
            seed: job.seed,
            image: job.image,
            mask: job.mask,
            strength: job.strength,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBackgroundJob {
    pub scene: String,
    pub image: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    pub session: String,
    /// Overrides the configured output directory
    pub output_dir: Option<PathBuf>,
    pub scenes: Vec<SceneJob>,
    pub remove_background: Vec<RemoveBackgroundJob>,
}

/// A task ready to queue with its repeat count.
#[derive(Debug)]
pub struct PlannedTask {
    pub params: ImageTask,
    pub total: u32,
}

impl Batch {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| LoomError::Library(format!("{}: {}", path.display(), e)))
    }

    fn scene_dir(&self, default_output: &Path, scene: &str) -> PathBuf {
        self.output_dir
            .as_deref()
            .unwrap_or(default_output)
            .join(&self.session)
            .join(scene)
    }

    /// Compose every scene against `store`.
    ///
    /// Template errors abort the whole plan so nothing from a broken batch gets queued.
    pub fn plan<S>(&self, store: &S, default_output: &Path) -> Result<Vec<PlannedTask>>
    where
        S: PieceStore + ?Sized,
    {
        let mut planned = Vec::new();
        for scene in &self.scenes {
            let prompts = compose_prompts(&scene.recipe, store)?;
            if prompts.is_empty() {
                tracing::warn!(scene = %scene.name, "Scene has a slot with no enabled pieces, skipping");
            }
            for prompt in prompts {
                let job = GenerateJob {
                    kind: scene.kind,
                    prompt,
                    negative: scene.negative.clone(),
                    steps: scene.steps,
                    seed: Some(scene.seed.unwrap_or_else(random_base_seed)),
                    image: scene.image.clone(),
                    mask: scene.mask.clone(),
                    strength: scene.strength,
                    ..GenerateJob::default()
                };
                let params = ImageTask::new(
                    &self.session,
                    &scene.name,
                    self.scene_dir(default_output, &scene.name),
                    Job::Generate(job),
                )
                .with_resolution(scene.resolution)
                .with_fast(scene.fast);
                planned.push(PlannedTask {
                    params,
                    total: scene.count,
                });
            }
        }
        for removal in &self.remove_background {
            let params = ImageTask::new(
                &self.session,
                &removal.scene,
                self.scene_dir(default_output, &removal.scene),
                Job::RemoveBackground {
                    image: removal.image.clone(),
                },
            );
            planned.push(PlannedTask { params, total: 1 });
        }
        Ok(planned)
    }
}

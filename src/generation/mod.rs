//! Image generation tasks for the scheduler.
//!
//! [`ImageTask`] is the parameter type queued in a `TaskQueue<ImageTask>`. The handlers in
//! [`handlers`] turn it into calls against an [`ImageBackend`] or [`BackgroundRemover`].

pub mod batch;
pub mod command;
pub mod handlers;
pub mod ip;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::step_seed;
use crate::prompt::PromptNode;

pub use batch::{Batch, PlannedTask, RemoveBackgroundJob, SceneJob};
pub use command::{CommandBackend, CommandConfig};
pub use handlers::{GenerateHandler, HandlerSettings, IpCheck, RemoveBgHandler, image_handlers};
pub use ip::{HttpIpProbe, IpCheckConfig, IpProbe};

pub const REMOVE_BG_TASK: &str = "remove-bg";

/// Step count above which a generation is flagged as costly.
pub const COSTLY_STEPS: u32 = 28;

pub const DEFAULT_FALLBACK_PROMPT: &str = "1girl";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    SmallLandscape,
    SmallPortrait,
    SmallSquare,
    Landscape,
    #[default]
    Portrait,
    Square,
    LargeLandscape,
    LargePortrait,
    LargeSquare,
    WallpaperPortrait,
    WallpaperLandscape,
}

impl Resolution {
    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::SmallLandscape => (768, 512),
            Resolution::SmallPortrait => (512, 768),
            Resolution::SmallSquare => (640, 640),
            Resolution::Landscape => (1216, 832),
            Resolution::Portrait => (832, 1216),
            Resolution::Square => (1024, 1024),
            Resolution::LargeLandscape => (1536, 1024),
            Resolution::LargePortrait => (1024, 1536),
            Resolution::LargeSquare => (1472, 1472),
            Resolution::WallpaperPortrait => (1088, 1920),
            Resolution::WallpaperLandscape => (1920, 1088),
        }
    }

    /// Large and wallpaper sizes cost extra upstream.
    pub fn is_large(&self) -> bool {
        matches!(
            self,
            Resolution::LargeLandscape
                | Resolution::LargePortrait
                | Resolution::LargeSquare
                | Resolution::WallpaperPortrait
                | Resolution::WallpaperLandscape
        )
    }
}

/// Which generation model a job runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    #[default]
    Generate,
    Inpaint,
    I2i,
}

impl ImageKind {
    pub const ALL: [ImageKind; 3] = [ImageKind::Generate, ImageKind::Inpaint, ImageKind::I2i];

    pub fn task_type(&self, fast: bool) -> &'static str {
        match (self, fast) {
            (ImageKind::Generate, false) => "generate",
            (ImageKind::Generate, true) => "generate-fast",
            (ImageKind::Inpaint, false) => "inpaint",
            (ImageKind::Inpaint, true) => "inpaint-fast",
            (ImageKind::I2i, false) => "i2i",
            (ImageKind::I2i, true) => "i2i-fast",
        }
    }

    pub fn model(&self) -> &'static str {
        match self {
            ImageKind::Generate => "anime",
            ImageKind::Inpaint => "inpaint",
            ImageKind::I2i => "i2i",
        }
    }
}

/// One prompt-driven generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateJob {
    pub kind: ImageKind,
    pub prompt: PromptNode,
    pub negative: String,
    pub steps: u32,
    pub seed: Option<u32>,
    /// Source image for inpaint and i2i
    pub image: Option<PathBuf>,
    pub mask: Option<PathBuf>,
    pub strength: Option<f32>,
    /// Used when the lowered prompt comes out empty
    pub fallback_prompt: String,
}

impl Default for GenerateJob {
    fn default() -> Self {
        Self {
            kind: ImageKind::Generate,
            prompt: PromptNode::default(),
            negative: String::new(),
            steps: COSTLY_STEPS,
            seed: None,
            image: None,
            mask: None,
            strength: None,
            fallback_prompt: DEFAULT_FALLBACK_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Job {
    Generate(GenerateJob),
    RemoveBackground { image: PathBuf },
}

/// Parameters of a queued image task.
#[derive(Debug)]
pub struct ImageTask {
    pub session: String,
    pub scene: String,
    pub output_dir: PathBuf,
    pub resolution: Resolution,
    /// Skip the regular backoff on early attempts
    pub fast: bool,
    pub job: Job,
    seed: Mutex<Option<u32>>,
}

impl ImageTask {
    pub fn new(session: impl Into<String>, scene: impl Into<String>, output_dir: impl Into<PathBuf>, job: Job) -> Self {
        let seed = match &job {
            Job::Generate(generate) => generate.seed,
            Job::RemoveBackground { .. } => None,
        };
        Self {
            session: session.into(),
            scene: scene.into(),
            output_dir: output_dir.into(),
            resolution: Resolution::default(),
            fast: false,
            job,
            seed: Mutex::new(seed),
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Queue key of the handler for this task.
    pub fn task_type(&self) -> &'static str {
        match &self.job {
            Job::Generate(job) => job.kind.task_type(self.fast),
            Job::RemoveBackground { .. } => REMOVE_BG_TASK,
        }
    }

    /// Seed for the next execution.
    pub fn seed(&self) -> Option<u32> {
        *self.seed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Advance the seed after a successful execution so repeats differ.
    pub fn advance_seed(&self) -> Option<u32> {
        let mut seed = self.seed.lock().unwrap_or_else(|e| e.into_inner());
        *seed = seed.map(step_seed);
        *seed
    }
}

/// Group key shared by every task of one scene.
pub fn scene_key(session: &str, scene: &str) -> String {
    format!("{}/{}", session, scene)
}

/// `<dir>/<unix-ms>.png`
pub fn output_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.png", chrono::Utc::now().timestamp_millis()))
}

/// Everything the backend needs for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative: String,
    pub model: String,
    pub resolution: Resolution,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub seed: Option<u32>,
    pub image: Option<PathBuf>,
    pub mask: Option<PathBuf>,
    pub strength: Option<f32>,
    pub output_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoveBackgroundRequest {
    pub image: PathBuf,
    pub output_file: PathBuf,
}

/// Upstream image generation service.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate_image(&self, request: &GenerationRequest) -> Result<()>;
}

/// Local background removal.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove_background(&self, request: &RemoveBackgroundRequest) -> Result<()>;
}

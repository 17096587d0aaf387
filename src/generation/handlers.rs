//! Task handlers for image tasks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{LoomError, Result};
use crate::generation::{
    BackgroundRemover, COSTLY_STEPS, GenerationRequest, ImageBackend, ImageKind, ImageTask, IpProbe, Job,
    REMOVE_BG_TASK, RemoveBackgroundRequest, output_file_path, scene_key,
};
use crate::prompt::lower;
use crate::scheduler::{
    CostItem, EstimatorConfig, PacingConfig, RetryConfig, Task, TaskHandler, TaskInfo, TaskRun, TimeEstimator,
};

/// Settings shared by every image handler.
#[derive(Debug, Clone, Default)]
pub struct HandlerSettings {
    pub pacing: PacingConfig,
    pub retries: RetryConfig,
    pub estimator: EstimatorConfig,
}

/// IP probe plus whether a change stops the queue.
#[derive(Clone)]
pub struct IpCheck {
    pub probe: Arc<dyn IpProbe>,
    pub enforce: bool,
}

fn scene_name(task: &Task<ImageTask>) -> String {
    if task.params.scene.is_empty() {
        "(none)".to_string()
    } else {
        task.params.scene.clone()
    }
}

/// Remote generation for one [`ImageKind`], fast or regular pacing.
pub struct GenerateHandler {
    kind: ImageKind,
    fast: bool,
    backend: Arc<dyn ImageBackend>,
    ip_check: Option<IpCheck>,
    settings: HandlerSettings,
}

impl GenerateHandler {
    pub fn new(kind: ImageKind, fast: bool, backend: Arc<dyn ImageBackend>, settings: HandlerSettings) -> Self {
        Self {
            kind,
            fast,
            backend,
            ip_check: None,
            settings,
        }
    }

    pub fn with_ip_check(mut self, ip_check: Option<IpCheck>) -> Self {
        self.ip_check = ip_check;
        self
    }

    fn request(&self, task: &Task<ImageTask>) -> Result<GenerationRequest> {
        let Job::Generate(job) = &task.params.job else {
            return Err(LoomError::Task(format!(
                "{} handler cannot run a background removal job",
                self.task_type()
            )));
        };

        let mut prompt = lower(&job.prompt);
        if prompt.is_empty() {
            prompt = job.fallback_prompt.clone();
        }
        let (width, height) = task.params.resolution.dimensions();

        Ok(GenerationRequest {
            prompt,
            negative: job.negative.clone(),
            model: self.kind.model().to_string(),
            resolution: task.params.resolution,
            width,
            height,
            steps: job.steps,
            seed: task.params.seed(),
            image: job.image.clone(),
            mask: job.mask.clone(),
            strength: job.strength,
            output_file: output_file_path(&task.params.output_dir),
        })
    }
}

#[async_trait]
impl TaskHandler<ImageTask> for GenerateHandler {
    fn task_type(&self) -> &str {
        self.kind.task_type(self.fast)
    }

    fn create_time_estimator(&self) -> TimeEstimator {
        if self.fast {
            self.settings.estimator.create_fast(&self.settings.pacing)
        } else {
            self.settings.estimator.create()
        }
    }

    async fn handle_task(&self, task: &Task<ImageTask>, run: &TaskRun) -> Result<bool> {
        let request = self.request(task)?;
        tracing::debug!(task_id = %task.id, prompt = %request.prompt, "Lowered prompt");

        if let Some(check) = &self.ip_check {
            let ip = check.probe.current_ip().await;
            run.observe_ip(ip.as_deref(), check.enforce)?;
        }

        self.backend.generate_image(&request).await?;
        task.params.advance_seed();

        tracing::info!(
            task_id = %task.id,
            scene = %task.params.scene,
            output = %request.output_file.display(),
            "Image generated"
        );
        Ok(true)
    }

    fn num_tries(&self, _task: &Task<ImageTask>) -> u32 {
        self.settings.retries.generation
    }

    async fn handle_delay(&self, _task: &Task<ImageTask>, attempt: u32) {
        let delay = self.settings.pacing.attempt_delay(attempt, self.fast);
        tracing::trace!(attempt, delay_ms = delay.as_millis() as u64, "Attempt delay");
        tokio::time::sleep(delay).await;
    }

    fn group_key(&self, task: &Task<ImageTask>) -> String {
        scene_key(&task.params.session, &task.params.scene)
    }

    fn info(&self, task: &Task<ImageTask>) -> TaskInfo {
        TaskInfo {
            name: scene_name(task),
            label: self.task_type().to_string(),
        }
    }

    fn calculate_cost(&self, task: &Task<ImageTask>) -> Vec<CostItem> {
        let mut items = Vec::new();
        let scene = scene_name(task);
        if let Job::Generate(job) = &task.params.job
            && job.steps > COSTLY_STEPS
        {
            items.push(CostItem {
                scene: scene.clone(),
                text: format!("more than {} steps", COSTLY_STEPS),
            });
        }
        if task.params.resolution.is_large() {
            items.push(CostItem {
                scene,
                text: "large resolution".to_string(),
            });
        }
        items
    }
}

/// Local background removal. One try, no pacing.
pub struct RemoveBgHandler {
    remover: Arc<dyn BackgroundRemover>,
    settings: HandlerSettings,
}

impl RemoveBgHandler {
    pub fn new(remover: Arc<dyn BackgroundRemover>, settings: HandlerSettings) -> Self {
        Self { remover, settings }
    }
}

#[async_trait]
impl TaskHandler<ImageTask> for RemoveBgHandler {
    fn task_type(&self) -> &str {
        REMOVE_BG_TASK
    }

    fn create_time_estimator(&self) -> TimeEstimator {
        self.settings.estimator.create()
    }

    async fn handle_task(&self, task: &Task<ImageTask>, _run: &TaskRun) -> Result<bool> {
        let Job::RemoveBackground { image } = &task.params.job else {
            return Err(LoomError::Task("remove-bg handler needs a background removal job".to_string()));
        };
        let request = RemoveBackgroundRequest {
            image: image.clone(),
            output_file: output_file_path(&task.params.output_dir),
        };
        self.remover.remove_background(&request).await?;
        tracing::info!(task_id = %task.id, output = %request.output_file.display(), "Background removed");
        Ok(true)
    }

    fn num_tries(&self, _task: &Task<ImageTask>) -> u32 {
        self.settings.retries.remove_background
    }

    async fn handle_delay(&self, _task: &Task<ImageTask>, _attempt: u32) {}

    fn group_key(&self, task: &Task<ImageTask>) -> String {
        scene_key(&task.params.session, &task.params.scene)
    }

    fn info(&self, task: &Task<ImageTask>) -> TaskInfo {
        TaskInfo {
            name: scene_name(task),
            label: REMOVE_BG_TASK.to_string(),
        }
    }
}

/// Every image handler: regular and fast for each kind, plus background removal.
pub fn image_handlers(
    backend: Arc<dyn ImageBackend>,
    remover: Arc<dyn BackgroundRemover>,
    ip_check: Option<IpCheck>,
    settings: HandlerSettings,
) -> Vec<Arc<dyn TaskHandler<ImageTask>>> {
    let mut handlers: Vec<Arc<dyn TaskHandler<ImageTask>>> = Vec::new();
    for kind in ImageKind::ALL {
        for fast in [false, true] {
            let handler = GenerateHandler::new(kind, fast, Arc::clone(&backend), settings.clone())
                .with_ip_check(ip_check.clone());
            handlers.push(Arc::new(handler));
        }
    }
    handlers.push(Arc::new(RemoveBgHandler::new(remover, settings)));
    handlers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerateJob, Resolution};
    use crate::prompt::PromptNode;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        requests: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl ImageBackend for RecordingBackend {
        async fn generate_image(&self, request: &GenerationRequest) -> Result<()> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    struct FixedIp(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl IpProbe for FixedIp {
        async fn current_ip(&self) -> Option<String> {
            self.0.lock().unwrap().pop().map(str::to_string)
        }
    }

    fn generate_task(job: GenerateJob) -> Task<ImageTask> {
        let params = ImageTask::new("default", "beach", "/out", Job::Generate(job));
        Task::new(params.task_type(), params, 1)
    }

    #[tokio::test]
    async fn test_empty_prompt_falls_back() {
        let backend = Arc::new(RecordingBackend::default());
        let handler = GenerateHandler::new(ImageKind::Generate, false, backend.clone(), HandlerSettings::default());
        let task = generate_task(GenerateJob::default());
        assert!(handler.handle_task(&task, &TaskRun::new(10)).await.unwrap());

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, "1girl");
        assert_eq!(requests[0].model, "anime");
        assert_eq!((requests[0].width, requests[0].height), (832, 1216));
    }

    #[tokio::test]
    async fn test_seed_advances_after_success() {
        let backend = Arc::new(RecordingBackend::default());
        let handler = GenerateHandler::new(ImageKind::Generate, true, backend.clone(), HandlerSettings::default());
        let task = generate_task(GenerateJob {
            prompt: PromptNode::text("smile"),
            seed: Some(1),
            ..GenerateJob::default()
        });
        let run = TaskRun::new(10);
        handler.handle_task(&task, &run).await.unwrap();
        handler.handle_task(&task, &run).await.unwrap();

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].seed, Some(1));
        assert_eq!(requests[1].seed, Some(270369));
        assert_eq!(requests[0].prompt, "smile");
    }

    #[tokio::test]
    async fn test_ip_change_is_policy_violation() {
        let backend = Arc::new(RecordingBackend::default());
        let probe = Arc::new(FixedIp(Mutex::new(vec!["2.2.2.2", "1.1.1.1"])));
        let handler = GenerateHandler::new(ImageKind::Generate, false, backend.clone(), HandlerSettings::default())
            .with_ip_check(Some(IpCheck { probe, enforce: true }));
        let task = generate_task(GenerateJob::default());
        let run = TaskRun::new(10);

        handler.handle_task(&task, &run).await.unwrap();
        let err = handler.handle_task(&task, &run).await.unwrap_err();
        assert!(err.is_policy_violation());
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_job_kind_fails() {
        let handler = GenerateHandler::new(
            ImageKind::Generate,
            false,
            Arc::new(RecordingBackend::default()),
            HandlerSettings::default(),
        );
        let params = ImageTask::new("s", "a", "/out", Job::RemoveBackground {
            image: PathBuf::from("in.png"),
        });
        let task = Task::new("generate", params, 1);
        let err = handler.handle_task(&task, &TaskRun::new(1)).await.unwrap_err();
        assert!(matches!(err, LoomError::Task(_)));
    }

    #[test]
    fn test_cost_items() {
        let handler = GenerateHandler::new(
            ImageKind::Generate,
            false,
            Arc::new(RecordingBackend::default()),
            HandlerSettings::default(),
        );
        let cheap = generate_task(GenerateJob::default());
        assert!(handler.calculate_cost(&cheap).is_empty());

        let params = ImageTask::new(
            "default",
            "beach",
            "/out",
            Job::Generate(GenerateJob {
                steps: 50,
                ..GenerateJob::default()
            }),
        )
        .with_resolution(Resolution::WallpaperPortrait);
        let costly = Task::new("generate", params, 1);
        let items = handler.calculate_cost(&costly);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.scene == "beach"));
    }

    #[test]
    fn test_group_key_and_info() {
        let handler = GenerateHandler::new(
            ImageKind::Inpaint,
            true,
            Arc::new(RecordingBackend::default()),
            HandlerSettings::default(),
        );
        let task = generate_task(GenerateJob::default());
        assert_eq!(handler.group_key(&task), "default/beach");
        let info = handler.info(&task);
        assert_eq!(info.name, "beach");
        assert_eq!(info.label, "inpaint-fast");
    }

    #[test]
    fn test_image_handlers_cover_all_types() {
        let backend = Arc::new(RecordingBackend::default());
        struct NoopRemover;
        #[async_trait]
        impl BackgroundRemover for NoopRemover {
            async fn remove_background(&self, _request: &RemoveBackgroundRequest) -> Result<()> {
                Ok(())
            }
        }
        let handlers = image_handlers(backend, Arc::new(NoopRemover), None, HandlerSettings::default());
        let mut types: Vec<&str> = handlers.iter().map(|h| h.task_type()).collect();
        types.sort();
        assert_eq!(
            types,
            vec!["generate", "generate-fast", "i2i", "i2i-fast", "inpaint", "inpaint-fast", "remove-bg"]
        );
    }

    #[test]
    fn test_retry_counts_per_family() {
        let settings = HandlerSettings::default();
        let task = generate_task(GenerateJob::default());
        let generate = GenerateHandler::new(
            ImageKind::Generate,
            false,
            Arc::new(RecordingBackend::default()),
            settings.clone(),
        );
        assert_eq!(generate.num_tries(&task), 40);
        struct NoopRemover;
        #[async_trait]
        impl BackgroundRemover for NoopRemover {
            async fn remove_background(&self, _request: &RemoveBackgroundRequest) -> Result<()> {
                Ok(())
            }
        }
        let remove = RemoveBgHandler::new(Arc::new(NoopRemover), settings);
        assert_eq!(remove.num_tries(&task), 1);
    }
}

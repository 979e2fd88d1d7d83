use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    LoadingConfig,
    Launching,
    MeshImport,
    Setup,
    Numerics,
    Initialization,
    WritingCase,
    Solving,
    PostProcessing,
    CaseSkipped,
    ParametricStudy,
    StudyPostProcessing,
    Finishing,
    Completed,
}

impl RunStage {
    pub fn label(&self) -> &'static str {
        match self {
            RunStage::LoadingConfig => "loading config",
            RunStage::Launching => "launching solver",
            RunStage::MeshImport => "mesh import",
            RunStage::Setup => "setup",
            RunStage::Numerics => "numerics",
            RunStage::Initialization => "initialization",
            RunStage::WritingCase => "writing case",
            RunStage::Solving => "solving",
            RunStage::PostProcessing => "post-processing",
            RunStage::CaseSkipped => "skipped",
            RunStage::ParametricStudy => "parametric study",
            RunStage::StudyPostProcessing => "study post-processing",
            RunStage::Finishing => "finishing",
            RunStage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    /// Case or study the event belongs to.
    pub target: Option<String>,
    pub stage: RunStage,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
}

impl RunProgressEvent {
    pub fn stage(
        target: Option<&str>,
        stage: RunStage,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            target: target.map(str::to_string),
            stage,
            elapsed_wall_s,
            message,
        }
    }
}

/// Optional progress sink plus the clock events are measured against.
pub struct Progress<'a> {
    callback: Option<&'a mut dyn FnMut(RunProgressEvent)>,
    started: Instant,
}

impl<'a> Progress<'a> {
    pub fn new(callback: Option<&'a mut dyn FnMut(RunProgressEvent)>) -> Self {
        Self {
            callback,
            started: Instant::now(),
        }
    }

    pub fn elapsed_s(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn emit(&mut self, target: Option<&str>, stage: RunStage, message: Option<String>) {
        let elapsed = self.elapsed_s();
        if let Some(cb) = self.callback.as_deref_mut() {
            cb(RunProgressEvent::stage(target, stage, elapsed, message));
        }
    }
}

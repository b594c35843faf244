//! Script-execution collaborator.
//!
//! Long-running analysis jobs are external programs run by an interpreter.
//! Each run is keyed by the caller's tracking id so that the progress endpoint
//! can report on it while it is still going.

mod jobs;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use jobs::{DEFAULT_PROGRESS, JobGuard, ScriptJobs};
pub use runner::{
    PROGRESS_PREFIX, ProcessScriptRunner, RESPONSE_PREFIX, ScriptError, ScriptResult,
    ScriptRunner,
};

/// A POST route that runs one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRoute {
    /// Absolute route prefix, e.g. `/medfl/run-pipeline`. The tracking id is
    /// appended as the last path segment.
    pub path: String,
    /// Program path, relative to `scripts.root` unless absolute.
    pub program: String,
}

impl ScriptRoute {
    pub fn new(path: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            program: program.into(),
        }
    }
}

/// Script collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Interpreter used to launch every program.
    pub interpreter: String,
    /// Directory programs are resolved against and run from.
    pub root: Option<String>,
    /// Extra progress endpoints besides `{base}/progress`.
    pub progress_paths: Vec<String>,
    pub routes: Vec<ScriptRoute>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            root: None,
            progress_paths: vec!["/application/progress".to_string()],
            routes: default_routes(),
        }
    }
}

fn default_routes() -> Vec<ScriptRoute> {
    [
        ("/application/predict", "modules/learning/predict.py"),
        (
            "/application/get_imputed_columns",
            "modules/learning/get_optional_columns.py",
        ),
        (
            "/connection/register_ssh_key",
            "modules/connection/register_ssh_key.py",
        ),
        (
            "/connection/connection_test_request",
            "modules/connection/connection_test_request.py",
        ),
        ("/medfl/hello_world", "modules/medfl/hello_world_medfl.py"),
        ("/medfl/config-db", "modules/medfl/fl_setDB_config.py"),
        ("/medfl/run-pipeline", "modules/medfl/run_fl_pipeline_copy.py"),
        ("/medfl/param-optim", "modules/medfl/flParamsOptim.py"),
        ("/medfl/read-pkl", "modules/medfl/readPKLmodel.py"),
        ("/medfl/rw/run-server", "modules/medfl/runServer.py"),
        ("/medfl/rw/stop-server", "modules/medfl/stopServer.py"),
    ]
    .into_iter()
    .map(|(path, program)| ScriptRoute::new(path, program))
    .collect()
}

/// Runner plus the job table it reports progress into.
#[derive(Clone)]
pub struct ScriptService {
    runner: Arc<dyn ScriptRunner>,
    jobs: ScriptJobs,
}

impl ScriptService {
    pub fn new(runner: Arc<dyn ScriptRunner>, jobs: ScriptJobs) -> Self {
        Self { runner, jobs }
    }

    /// Service backed by a [`ProcessScriptRunner`] built from `config`.
    pub fn from_config(config: &ScriptConfig) -> Self {
        let jobs = ScriptJobs::new();
        let runner = ProcessScriptRunner::new(
            config.interpreter.clone(),
            config.root.as_ref().map(PathBuf::from),
            jobs.clone(),
        );
        Self::new(Arc::new(runner), jobs)
    }

    pub fn jobs(&self) -> &ScriptJobs {
        &self.jobs
    }

    /// Run `program` under `tracking_id`. The id is registered for the
    /// duration of the run and released afterwards whatever the outcome.
    pub async fn execute(
        &self,
        program: &str,
        json_config: &str,
        tracking_id: &str,
    ) -> ScriptResult<String> {
        let _job = self.jobs.start(tracking_id);
        self.runner.run(json_config, program, tracking_id).await
    }

    /// Last progress reported for `tracking_id`.
    pub fn progress(&self, tracking_id: &str) -> String {
        self.jobs.progress(tracking_id)
    }
}

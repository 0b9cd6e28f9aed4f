use crate::pipeline::Pipeline;

/// Shared application state for the web server
pub struct AppState {
    pub pipeline: Pipeline,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            startup_time: chrono::Utc::now(),
        }
    }
}

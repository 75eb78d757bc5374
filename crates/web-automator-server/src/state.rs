use std::path::Path;
use std::sync::Arc;
use web_automator::{
    actuator::{http::HttpActuatorFactory, ActuatorSource},
    agent::Agent,
    configuration::Settings,
    playbooks::DirectoryPlaybooks,
    providers::base::Provider,
    test_sink::DirectoryTestSink,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// An agent for one request; each run gets its own actuator session
    pub fn agent(&self, provider: Box<dyn Provider>) -> Agent {
        let settings = &self.settings;
        Agent::new(
            provider,
            ActuatorSource::Owned(Arc::new(HttpActuatorFactory::new(
                settings.actuator.clone(),
            ))),
        )
        .with_config(settings.agent.clone())
        .with_playbooks(Arc::new(DirectoryPlaybooks::new(Path::new(
            &settings.playbooks.skills_dir,
        ))))
        .with_test_sink(Arc::new(DirectoryTestSink::new(Path::new(
            &settings.tests.tests_dir,
        ))))
    }
}

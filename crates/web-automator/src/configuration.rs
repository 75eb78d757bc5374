use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::actuator::ActuatorSettings;
use crate::agent::AgentConfig;
use crate::providers::{
    configs::{
        AnthropicProviderConfig, OpenAiProviderConfig, ProviderConfig, ANTHROPIC_HOST,
        ANTHROPIC_MODEL, OPENAI_HOST, OPENAI_MODEL,
    },
    factory::ProviderType,
};

pub const ENV_PREFIX: &str = "WEB_AUTOMATOR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings key to the environment variable that sets it
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.to_uppercase().replace('.', "__"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybookSettings {
    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,
}

impl Default for PlaybookSettings {
    fn default() -> Self {
        Self {
            skills_dir: default_skills_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestSinkSettings {
    #[serde(default = "default_tests_dir")]
    pub tests_dir: String,
}

impl Default for TestSinkSettings {
    fn default() -> Self {
        Self {
            tests_dir: default_tests_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::defaults_for(ProviderType::Anthropic)
    }
}

impl ProviderSettings {
    pub fn defaults_for(provider_type: ProviderType) -> Self {
        match provider_type {
            ProviderType::Anthropic => ProviderSettings::Anthropic {
                host: default_anthropic_host(),
                api_key: None,
                model: default_anthropic_model(),
                temperature: None,
                max_tokens: None,
            },
            ProviderType::OpenAi => ProviderSettings::OpenAi {
                host: default_openai_host(),
                api_key: None,
                model: default_openai_model(),
                temperature: None,
                max_tokens: None,
            },
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderSettings::Anthropic { model, .. } | ProviderSettings::OpenAi { model, .. } => {
                model
            }
        }
    }

    pub fn with_model(mut self, new_model: &str) -> Self {
        match &mut self {
            ProviderSettings::Anthropic { model, .. } | ProviderSettings::OpenAi { model, .. } => {
                *model = new_model.to_string();
            }
        }
        self
    }

    /// The conventional variable consulted when no key is configured
    pub fn fallback_key_var(&self) -> &'static str {
        match self {
            ProviderSettings::Anthropic { .. } => "ANTHROPIC_API_KEY",
            ProviderSettings::OpenAi { .. } => "OPENAI_API_KEY",
        }
    }

    // Convert to the ProviderConfig the adapters take
    pub fn into_config(self) -> Result<ProviderConfig, ConfigError> {
        let fallback = self.fallback_key_var();
        let resolve_key = |api_key: Option<String>| -> Result<String, ConfigError> {
            api_key
                .filter(|key| !key.is_empty())
                .or_else(|| std::env::var(fallback).ok().filter(|key| !key.is_empty()))
                .ok_or_else(|| ConfigError::MissingEnvVar {
                    env_var: format!("{} or {}", to_env_var("provider.api_key"), fallback),
                })
        };

        match self {
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => Ok(ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key: resolve_key(api_key)?,
                model,
                temperature,
                max_tokens,
            })),
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key: resolve_key(api_key)?,
                model,
                temperature,
                max_tokens,
            })),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub actuator: ActuatorSettings,
    #[serde(default)]
    pub playbooks: PlaybookSettings,
    #[serde(default)]
    pub tests: TestSinkSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.type", ProviderType::Anthropic.to_string())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // "missing field `type`" names the field but not its parent
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_skills_dir() -> String {
    "skills".to_string()
}

fn default_tests_dir() -> String {
    "generated_tests".to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_anthropic_model() -> String {
    ANTHROPIC_MODEL.to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_MODEL.to_string()
}

use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig,
    openai::OpenAiProvider,
};
use crate::configuration::ProviderSettings;
use anyhow::Result;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderType {
    Anthropic,
    OpenAi,
}

/// Raised when a caller names a backend that does not exist
#[derive(Debug, thiserror::Error)]
#[error("Unknown provider: '{0}'. Choose 'anthropic' or 'openai'.")]
pub struct UnknownProviderError(pub String);

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider + Send + Sync>> {
    match config {
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config)?))
        }
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
    }
}

/// Resolve the configured backend, optionally switching to another one by name and
/// overriding the model.
///
/// Switching to a different backend starts from that backend's defaults rather than
/// carrying over the configured host and key.
pub fn build_provider(
    settings: &ProviderSettings,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<Box<dyn Provider + Send + Sync>> {
    let mut settings = settings.clone();

    if let Some(name) = provider {
        let provider_type = ProviderType::from_str(name.trim())
            .map_err(|_| UnknownProviderError(name.to_string()))?;
        if provider_type != settings.provider_type() {
            settings = ProviderSettings::defaults_for(provider_type);
        }
    }
    if let Some(model) = model {
        settings = settings.with_model(model);
    }

    get_provider(settings.into_config()?)
}

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-latest";
pub const OPENAI_HOST: &str = "https://api.openai.com";
pub const OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: i32 = 4096;

// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Anthropic(AnthropicProviderConfig),
    OpenAi(OpenAiProviderConfig),
}

#[derive(Debug, Clone)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

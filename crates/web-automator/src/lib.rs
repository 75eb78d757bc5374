pub mod actuator;
pub mod agent;
pub mod configuration;
pub mod errors;
pub mod models;
pub mod playbooks;
pub mod prompt_template;
pub mod providers;
pub mod test_sink;
pub mod tools;

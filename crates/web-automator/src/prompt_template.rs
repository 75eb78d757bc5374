use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

use crate::tools::DONE;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[derive(Serialize)]
struct SystemContext {
    done_tool: &'static str,
    has_playbooks: bool,
}

/// The instructions every run starts with
pub fn system_prompt(has_playbooks: bool) -> Result<String, TeraError> {
    let context = SystemContext {
        done_tool: DONE,
        has_playbooks,
    };
    Ok(load_prompt(SYSTEM_TEMPLATE, &context)?.trim_end().to_string())
}

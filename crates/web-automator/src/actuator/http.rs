use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{truncate_chars, Actuator, ActuatorFactory, ActuatorSettings, ToolResult};
use crate::models::tool::JsonObject;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref BODY: Selector = Selector::parse("body").unwrap();
    static ref LINK: Selector = Selector::parse("a[href]").unwrap();
}

/// A fetched document
struct Page {
    url: Url,
    status: u16,
    html: String,
}

impl Page {
    fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    fn title(&self) -> String {
        self.document()
            .select(&TITLE)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }

    fn content(&self, cap: usize) -> String {
        let document = self.document();
        let text = visible_text(&document);
        format!(
            "URL: {}\nTitle: {}\n\n{}",
            self.url,
            self.title(),
            truncate_chars(text.trim(), cap)
        )
    }
}

#[derive(Default)]
struct Session {
    client: Option<Client>,
    page: Option<Page>,
}

/// An actuator that drives pages over plain HTTP.
///
/// Pages are fetched and parsed, never rendered: navigation, reading and following links
/// work, while anything that needs a live DOM (typing, scrolling, screenshots) is reported
/// as a failed action.
pub struct HttpActuator {
    settings: ActuatorSettings,
    session: Mutex<Session>,
}

impl HttpActuator {
    pub fn new(settings: ActuatorSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(Session::default()),
        }
    }

    fn normalize_url(&self, raw: &str) -> Result<Url, String> {
        let raw = raw.trim();
        let full = if let Some(rest) = raw.strip_prefix("http://") {
            if self.settings.upgrade_insecure {
                format!("https://{}", rest)
            } else {
                raw.to_string()
            }
        } else if raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        Url::parse(&full).map_err(|e| format!("Invalid url '{}': {}", raw, e))
    }

    async fn fetch(&self, client: &Client, url: Url) -> Result<Page, String> {
        debug!(%url, "fetching page");
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| format!("Navigation to {} failed: {}", url, e))?;

        let status = response.status().as_u16();
        // redirects are followed, keep the final location for relative links
        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| format!("Reading {} failed: {}", final_url, e))?;

        Ok(Page {
            url: final_url,
            status,
            html,
        })
    }

    async fn act(
        &self,
        session: &mut Session,
        client: &Client,
        name: &str,
        arguments: &JsonObject,
    ) -> Result<ToolResult, String> {
        match name {
            "navigate" => {
                let url = self.normalize_url(required(arguments, "url")?)?;
                let page = self.fetch(client, url).await?;
                let output = format!(
                    "Navigated to {} (status={}, title='{}')",
                    page.url,
                    page.status,
                    page.title()
                );
                session.page = Some(page);
                return Ok(ToolResult::ok(output));
            }
            "type" | "scroll" | "screenshot" => {
                return Err(format!("'{}' requires an interactive browser", name));
            }
            _ => {}
        }

        let page = session
            .page
            .as_ref()
            .ok_or_else(|| "No page loaded".to_string())?;

        match name {
            "click" => {
                let selector = required(arguments, "selector")?;
                let target = click_target(page, selector)?;
                let next = self.fetch(client, target).await?;
                let output = format!(
                    "Clicked '{}' and navigated to {} (status={}, title='{}')",
                    selector,
                    next.url,
                    next.status,
                    next.title()
                );
                session.page = Some(next);
                Ok(ToolResult::ok(output))
            }
            "wait_for" => {
                let selector = required(arguments, "selector")?;
                if matches_selector(page, selector)? {
                    Ok(ToolResult::ok(format!("Element '{}' appeared", selector)))
                } else {
                    Err(format!(
                        "Element '{}' is not present on {}",
                        selector, page.url
                    ))
                }
            }
            "get_page_content" => Ok(ToolResult::ok(page.content(self.settings.page_text_cap))),
            "get_html" => {
                let selector = arguments.get("selector").and_then(Value::as_str);
                let html = select_html(page, selector)?;
                Ok(ToolResult::ok(truncate_chars(&html, self.settings.html_cap)))
            }
            "extract" => {
                let description = required(arguments, "description")?;
                Ok(ToolResult::ok(format!(
                    "Page content for extraction ('{}'):\n{}",
                    description,
                    page.content(self.settings.page_text_cap)
                )))
            }
            other => Err(format!("Unknown tool: '{}'", other)),
        }
    }
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn start(&self) -> Result<()> {
        let client = Client::builder()
            .user_agent(self.settings.user_agent.as_str())
            .timeout(Duration::from_millis(self.settings.navigation_timeout_ms))
            .build()?;

        info!(user_agent = %self.settings.user_agent, "http actuator started");
        let mut session = self.session.lock().await;
        session.client = Some(client);
        session.page = None;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.client = None;
        session.page = None;
        info!("http actuator stopped");
        Ok(())
    }

    async fn execute(&self, name: &str, arguments: &JsonObject) -> Result<ToolResult> {
        let mut session = self.session.lock().await;
        let Some(client) = session.client.clone() else {
            return Ok(ToolResult::failure("Browser not started"));
        };

        let result = self
            .act(&mut session, &client, name, arguments)
            .await
            .unwrap_or_else(ToolResult::failure);
        Ok(result)
    }
}

/// Builds an [`HttpActuator`] per run
pub struct HttpActuatorFactory {
    settings: ActuatorSettings,
}

impl HttpActuatorFactory {
    pub fn new(settings: ActuatorSettings) -> Self {
        Self { settings }
    }
}

impl ActuatorFactory for HttpActuatorFactory {
    fn create(&self) -> Result<Box<dyn Actuator>> {
        Ok(Box::new(HttpActuator::new(self.settings.clone())))
    }
}

fn required<'a>(arguments: &'a JsonObject, field: &str) -> Result<&'a str, String> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing argument '{}'", field))
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("Invalid selector '{}': {}", selector, e))
}

/// Resolve what a click on `target` would open: the first element matching it as a CSS
/// selector, else the first link whose text contains it.
fn click_target(page: &Page, target: &str) -> Result<Url, String> {
    let document = page.document();

    if let Ok(selector) = Selector::parse(target) {
        if let Some(element) = document.select(&selector).next() {
            let href = element.value().attr("href").ok_or_else(|| {
                format!(
                    "Element '{}' is not a link; clicking it requires an interactive browser",
                    target
                )
            })?;
            return page
                .url
                .join(href)
                .map_err(|e| format!("Invalid link '{}': {}", href, e));
        }
    }

    let wanted = target.trim();
    let href = document
        .select(&LINK)
        .find(|link| link.text().collect::<String>().contains(wanted))
        .and_then(|link| link.value().attr("href"))
        .ok_or_else(|| format!("No element matches '{}'", target))?;
    page.url
        .join(href)
        .map_err(|e| format!("Invalid link '{}': {}", href, e))
}

fn matches_selector(page: &Page, selector: &str) -> Result<bool, String> {
    let selector = parse_selector(selector)?;
    Ok(page.document().select(&selector).next().is_some())
}

fn select_html(page: &Page, selector: Option<&str>) -> Result<String, String> {
    let Some(raw) = selector.filter(|s| !s.trim().is_empty()) else {
        return Ok(page.html.clone());
    };
    let selector = parse_selector(raw)?;
    page.document()
        .select(&selector)
        .next()
        .map(|element| element.inner_html())
        .ok_or_else(|| format!("No element matches '{}'", raw))
}

/// Text nodes under `<body>`, skipping scripts and styles
fn visible_text(document: &Html) -> String {
    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        let text = text.trim();
        if !hidden && !text.is_empty() {
            lines.push(text);
        }
    }
    lines.join("\n")
}

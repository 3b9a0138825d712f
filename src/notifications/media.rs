//! Media plugins validating destination settings
//!
//! A plugin turns user supplied settings into their stored form: unknown keys
//! are dropped and media-specific defaults are added. Plugins are registered
//! in a `MediaRegistry` that the notification service owns.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use crate::config::NotificationConfig;
use crate::error::{AppError, Result};

/// E.164: a plus sign followed by 8 to 15 digits, no leading zero
static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{7,14}$").expect("valid phone number regex"));

pub trait MediaPlugin: Send + Sync {
    /// Identifier destinations refer to, e.g. "email"
    fn slug(&self) -> &'static str;

    /// Human readable name
    fn name(&self) -> &'static str;

    /// Validate raw settings and return their normalized form
    fn clean_settings(&self, settings: &Value) -> Result<Value>;

    /// The address inside normalized settings, used to detect duplicates
    fn address<'a>(&self, settings: &'a Value) -> Option<&'a str>;
}

fn parse_settings<T>(media: &str, settings: &Value) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    if !settings.is_object() {
        return Err(AppError::Validation(format!(
            "{} settings must be an object",
            media
        )));
    }
    let parsed: T = serde_json::from_value(settings.clone()).map_err(|e| {
        AppError::Validation(format!("invalid {} settings: {}", media, e))
    })?;
    parsed.validate()?;
    Ok(parsed)
}

#[derive(Debug, Deserialize, Validate)]
struct EmailSettings {
    #[validate(email)]
    email_address: String,
}

/// Email destinations: `{"email_address", "synced"}`
#[derive(Debug, Default)]
pub struct EmailMedia;

impl MediaPlugin for EmailMedia {
    fn slug(&self) -> &'static str {
        "email"
    }

    fn name(&self) -> &'static str {
        "Email"
    }

    fn clean_settings(&self, settings: &Value) -> Result<Value> {
        let parsed: EmailSettings = parse_settings(self.slug(), settings)?;
        Ok(json!({
            "email_address": parsed.email_address,
            "synced": false,
        }))
    }

    fn address<'a>(&self, settings: &'a Value) -> Option<&'a str> {
        settings.get("email_address").and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize, Validate)]
struct SmsSettings {
    #[validate(regex(path = *PHONE_NUMBER))]
    phone_number: String,
}

/// SMS destinations: `{"phone_number"}` in international format
#[derive(Debug, Default)]
pub struct SmsMedia;

impl MediaPlugin for SmsMedia {
    fn slug(&self) -> &'static str {
        "sms"
    }

    fn name(&self) -> &'static str {
        "SMS"
    }

    fn clean_settings(&self, settings: &Value) -> Result<Value> {
        let parsed: SmsSettings = parse_settings(self.slug(), settings)?;
        Ok(json!({ "phone_number": parsed.phone_number }))
    }

    fn address<'a>(&self, settings: &'a Value) -> Option<&'a str> {
        settings.get("phone_number").and_then(Value::as_str)
    }
}

/// The media plugins available to one notification service
#[derive(Clone, Default)]
pub struct MediaRegistry {
    plugins: BTreeMap<&'static str, Arc<dyn MediaPlugin>>,
}

impl MediaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in plugin
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailMedia));
        registry.register(Arc::new(SmsMedia));
        registry
    }

    /// Registry with the built-in plugins named in `enabled_media`
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        let builtin = Self::with_builtin();
        let mut registry = Self::new();
        for slug in &config.enabled_media {
            let plugin = builtin.plugins.get(slug.as_str()).ok_or_else(|| {
                AppError::Configuration(format!("unknown notification media {:?}", slug))
            })?;
            registry.register(Arc::clone(plugin));
        }
        Ok(registry)
    }

    /// Add a plugin, replacing any plugin with the same slug
    pub fn register(&mut self, plugin: Arc<dyn MediaPlugin>) {
        tracing::debug!(media = plugin.slug(), "Registered media plugin");
        self.plugins.insert(plugin.slug(), plugin);
    }

    pub fn get(&self, slug: &str) -> Result<Arc<dyn MediaPlugin>> {
        self.plugins
            .get(slug)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("media {:?} is not enabled", slug)))
    }

    /// Registered slugs in order
    pub fn slugs(&self) -> Vec<&'static str> {
        self.plugins.keys().copied().collect()
    }
}

//! Alfred script-filter payload: a list of items, each with optional
//! subtitle, arg, icon and per-modifier overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub items: Vec<Item>,
}

impl Feedback {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<ItemIcon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mods: Option<BTreeMap<String, ItemModifier>>,
}

impl Item {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            arg: None,
            valid: None,
            icon: None,
            mods: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    pub fn with_valid(mut self, valid: bool) -> Self {
        self.valid = Some(valid);
        self
    }

    pub fn with_icon(mut self, icon: ItemIcon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_mod(mut self, modifier: impl Into<String>, config: ItemModifier) -> Self {
        self.mods
            .get_or_insert_with(BTreeMap::new)
            .insert(modifier.into(), config);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ItemModifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

impl ItemModifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    pub fn with_valid(mut self, valid: bool) -> Self {
        self.valid = Some(valid);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemIcon {
    pub path: String,
}

impl ItemIcon {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_optional_fields_serialize_only_when_present() {
        let json = serde_json::to_string(&Item::new("Weather for Taipei")).expect("serialize");

        assert!(json.contains("title"));
        assert!(!json.contains("subtitle"));
        assert!(!json.contains("icon"));
        assert!(!json.contains("mods"));
    }

    #[test]
    fn cmd_modifier_serializes_under_mods() {
        let item = Item::new("Weather for Taipei").with_mod(
            "cmd",
            ItemModifier::new()
                .with_subtitle("Open this forecast in a browser")
                .with_arg("https://example.test/forecast")
                .with_valid(true),
        );

        let value = serde_json::to_value(Feedback::new(vec![item])).expect("serialize");
        let cmd = &value["items"][0]["mods"]["cmd"];
        assert_eq!(cmd["arg"], "https://example.test/forecast");
        assert_eq!(cmd["valid"], true);
    }
}

//! Script-filter output understood by the launcher host.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subtitle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autocomplete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<ItemText>,
}

/// Text used for copy (⌘C) and large type (⌘L).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemText {
    pub copy: String,
    pub largetype: String,
}

impl Item {
    /// An actionable item opening `url`.
    pub fn open(uid: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            uid: Some(uid.into()),
            title: title.into(),
            arg: Some(url.clone()),
            valid: true,
            text: Some(ItemText {
                copy: url.clone(),
                largetype: url,
            }),
            ..Self::default()
        }
    }

    /// A non-actionable informational item.
    pub fn info(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            valid: false,
            ..Self::default()
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_autocomplete(mut self, autocomplete: impl Into<String>) -> Self {
        self.autocomplete = Some(autocomplete.into());
        self
    }
}

/// Complete script-filter response.
///
/// `rerun` and `variables` are only present while some item is still
/// waiting on the cache service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    pub items: Vec<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerun: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

impl Response {
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_response_has_no_rerun() {
        let resp = Response {
            items: vec![Item::info("Nothing", "")],
            ..Response::default()
        };
        let json: serde_json::Value = serde_json::from_str(&resp.to_json().unwrap()).unwrap();
        assert!(json.get("rerun").is_none());
        assert!(json.get("variables").is_none());
        assert_eq!(json["items"][0]["valid"], false);
        assert!(json["items"][0].get("subtitle").is_none());
    }

    #[test]
    fn test_open_item_copies_url() {
        let item = Item::open("gh:a/b", "Open a/b", "https://github.com/a/b");
        assert_eq!(item.arg.as_deref(), Some("https://github.com/a/b"));
        assert_eq!(item.text.unwrap().copy, "https://github.com/a/b");
        assert!(item.valid);
    }
}

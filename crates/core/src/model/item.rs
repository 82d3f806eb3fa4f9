use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::answer::AnswerOption;
use crate::model::ids::ItemId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("media URL cannot be empty")]
    EmptyUrl,

    #[error("media URL is not absolute: {0}")]
    InvalidUrl(String),
}

//
// ─── MEDIA ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

/// Public object-storage asset attached to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub kind: MediaKind,
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

impl MediaAsset {
    /// # Errors
    ///
    /// Returns `MediaError` if the URL is blank or not absolute.
    pub fn new(
        kind: MediaKind,
        url: impl AsRef<str>,
        alt_text: Option<String>,
    ) -> Result<Self, MediaError> {
        let raw = url.as_ref().trim();
        if raw.is_empty() {
            return Err(MediaError::EmptyUrl);
        }
        let url = Url::parse(raw).map_err(|_| MediaError::InvalidUrl(raw.to_string()))?;
        let alt_text = alt_text.filter(|text| !text.trim().is_empty());
        Ok(Self {
            kind,
            url,
            alt_text,
        })
    }
}

//
// ─── ITEM ──────────────────────────────────────────────────────────────────────
//

/// A question served by the backend. Immutable once served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ItemWire", into = "ItemWire")]
pub struct Item {
    pub id: ItemId,
    /// Ordinal assigned by the backend; `0` when the backend omitted it.
    pub position: u32,
    pub question_text: String,
    pub options: [String; 5],
    pub category: Option<String>,
    pub is_scored: Option<bool>,
    pub media: Vec<MediaAsset>,
}

impl Item {
    #[must_use]
    pub fn option_text(&self, option: AnswerOption) -> &str {
        &self.options[option.index()]
    }

    /// Options paired with their letters, in display order.
    pub fn labelled_options(&self) -> impl Iterator<Item = (AnswerOption, &str)> {
        AnswerOption::ALL
            .into_iter()
            .map(move |option| (option, self.option_text(option)))
    }
}

#[derive(Serialize, Deserialize)]
struct ItemWire {
    id: ItemId,
    #[serde(default)]
    position: u32,
    question_text: String,
    option_a_text: String,
    option_b_text: String,
    option_c_text: String,
    option_d_text: String,
    option_e_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_scored: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    media: Vec<MediaAsset>,
}

impl From<ItemWire> for Item {
    fn from(wire: ItemWire) -> Self {
        Self {
            id: wire.id,
            position: wire.position,
            question_text: wire.question_text,
            options: [
                wire.option_a_text,
                wire.option_b_text,
                wire.option_c_text,
                wire.option_d_text,
                wire.option_e_text,
            ],
            category: wire.category,
            is_scored: wire.is_scored,
            media: wire.media,
        }
    }
}

impl From<Item> for ItemWire {
    fn from(item: Item) -> Self {
        let [a, b, c, d, e] = item.options;
        Self {
            id: item.id,
            position: item.position,
            question_text: item.question_text,
            option_a_text: a,
            option_b_text: b,
            option_c_text: c,
            option_d_text: d,
            option_e_text: e,
            category: item.category,
            is_scored: item.is_scored,
            media: item.media,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_JSON: &str = r#"{
        "id": 41,
        "position": 7,
        "question_text": "Most likely diagnosis?",
        "option_a_text": "Asthma",
        "option_b_text": "COPD",
        "option_c_text": "Pneumonia",
        "option_d_text": "Pulmonary embolism",
        "option_e_text": "Pneumothorax",
        "category": "Respiratory",
        "media": [{"kind": "image", "url": "https://cdn.example.org/cxr/41.png"}]
    }"#;

    #[test]
    fn item_decodes_flat_option_fields() {
        let item: Item = serde_json::from_str(ITEM_JSON).unwrap();
        assert_eq!(item.id, ItemId::new(41));
        assert_eq!(item.position, 7);
        assert_eq!(item.option_text(AnswerOption::D), "Pulmonary embolism");
        assert_eq!(item.media.len(), 1);
        assert_eq!(item.media[0].kind, MediaKind::Image);
        assert_eq!(item.is_scored, None);
    }

    #[test]
    fn item_without_position_defaults_to_zero() {
        let json = r#"{"id": 1, "question_text": "Q", "option_a_text": "a",
            "option_b_text": "b", "option_c_text": "c", "option_d_text": "d",
            "option_e_text": "e"}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.position, 0);
        assert!(item.media.is_empty());
    }

    #[test]
    fn item_missing_an_option_is_rejected() {
        let json = r#"{"id": 1, "question_text": "Q", "option_a_text": "a"}"#;
        assert!(serde_json::from_str::<Item>(json).is_err());
    }

    #[test]
    fn labelled_options_follow_letter_order() {
        let item: Item = serde_json::from_str(ITEM_JSON).unwrap();
        let letters: String = item.labelled_options().map(|(o, _)| o.letter()).collect();
        assert_eq!(letters, "ABCDE");
    }

    #[test]
    fn media_asset_requires_absolute_url() {
        assert_eq!(
            MediaAsset::new(MediaKind::Image, "  ", None),
            Err(MediaError::EmptyUrl)
        );
        assert!(matches!(
            MediaAsset::new(MediaKind::Audio, "clips/heart.mp3", None),
            Err(MediaError::InvalidUrl(_))
        ));
        let asset = MediaAsset::new(
            MediaKind::Audio,
            "https://cdn.example.org/heart.mp3",
            Some(" ".into()),
        )
        .unwrap();
        assert_eq!(asset.alt_text, None);
    }
}

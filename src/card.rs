use std::fmt;

use serde::Serialize;

use crate::labels::MoodResult;

pub const SHARE_TITLE: &str = "猫咪心情日记";
pub const SHARE_TEXT: &str = "看看我的猫咪今天心情如何！";

/// What the host's share sheet receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub url: String,
}

impl SharePayload {
    /// `None` when there is no page URL to share; callers skip the share
    /// action silently in that case.
    pub fn for_url(url: Option<&str>) -> Option<Self> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        Some(Self {
            title: SHARE_TITLE.to_string(),
            text: SHARE_TEXT.to_string(),
            url: url.to_string(),
        })
    }
}

/// Diary card rendered for a resolved mood.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodCard {
    pub mood: String,
    pub tag: String,
    pub diary: String,
    pub confidence: f32,
    pub requires_attention: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<SharePayload>,
}

impl MoodCard {
    pub fn new(mood: &MoodResult, image: Option<String>, share_url: Option<&str>) -> Self {
        Self {
            tag: format!("猫咪今天的心情是：{}", mood.label),
            mood: mood.label.clone(),
            diary: mood.caption.clone(),
            confidence: mood.confidence,
            requires_attention: mood.requires_attention,
            image,
            share: SharePayload::for_url(share_url),
        }
    }

    /// Replace the fixed caption with generated diary text.
    pub fn with_diary(mut self, diary: String) -> Self {
        self.diary = diary;
        self
    }
}

impl fmt::Display for MoodCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.tag)?;
        writeln!(f, "{}", self.diary)?;
        writeln!(
            f,
            "Anxiety: {}  (confidence {:.1}%)",
            if self.requires_attention { "Yes" } else { "No" },
            self.confidence * 100.0
        )?;
        if let Some(share) = &self.share {
            write!(f, "Share: {} - {} {}", share.title, share.text, share.url)?;
        }
        Ok(())
    }
}

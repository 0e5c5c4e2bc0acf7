use serde::{Deserialize, Serialize};

/// CSS locators for the meeting web UI
///
/// Defaults target the Google Meet UI. Each entry can be overridden from the
/// `[locators]` configuration section when the UI changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locators {
    /// Display-name input on the pre-join screen
    pub name_input: String,
    /// Prompt asking to allow the microphone
    pub mic_prompt: String,
    /// Control dismissing the microphone prompt
    pub mic_prompt_dismiss: String,
    /// Control only present while the call is active
    pub call_active: String,
    /// "Meet keeps you safe" notice
    pub keep_safe_notice: String,
    /// Control dismissing the safety notice
    pub keep_safe_dismiss: String,
    /// Control turning captions on
    pub captions_toggle: String,
    /// Region the captions are rendered into
    pub caption_region: String,
    /// Element holding the meeting title
    pub meeting_title: String,
    /// Element holding the participant count
    pub participant_count: String,
    /// Heading shown after being removed or the meeting ending
    pub removed_heading: String,
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            name_input: "input[type='text'][aria-label='Your name']".to_string(),
            mic_prompt: "div[role='dialog'][aria-modal='true']".to_string(),
            mic_prompt_dismiss: "div[role='dialog'] button[jsname='IbE0S']".to_string(),
            call_active: "button[jsname='CQylAd']".to_string(),
            keep_safe_notice: "div[aria-label='Meet keeps you safe']".to_string(),
            keep_safe_dismiss: "div[aria-label='Meet keeps you safe'] button".to_string(),
            captions_toggle: "button[jsname='r8qRAd']".to_string(),
            caption_region: "div[role='region'][aria-label='Captions']".to_string(),
            meeting_title: "div[jsname='NeC6gb']".to_string(),
            participant_count: "div[class='uGOf1d']".to_string(),
            removed_heading: "h1[jsname='r4nke']".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override_keeps_defaults() {
        let locators: Locators =
            serde_json::from_str(r#"{"call_active": "button.leave"}"#).unwrap();

        assert_eq!(locators.call_active, "button.leave");
        assert_eq!(locators.participant_count, Locators::default().participant_count);
    }
}

//! Prompt Templates
//!
//! A prompt template is the unit the user picks from a menu or from the popup
//! launcher. Templates are immutable once loaded; user edits are stored as
//! separate copies and merged over the built-in set by id.
//!
//! `type` and `action` travel as the numeric codes used by the stored
//! preferences (`0`, `1`, `2`); either numbers or numeric strings are accepted
//! when reading them back.

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

/// Where a prompt is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum PromptType {
    /// Reading and composing (when composing, a selection may still be required).
    AlwaysShow,
    /// Only while reading a mail.
    ReadingOnly,
    /// Only while composing a mail.
    ComposingOnly,
}

/// What happens with the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum PromptAction {
    /// Show the answer; the user just closes the window.
    Close,
    /// Open a reply to the originating mail with the answer as body.
    Reply,
    /// Replace the current selection in the compose window.
    ReplaceText,
}

/// Numeric code as stored in preferences: `1` or `"1"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumericCode {
    Number(u8),
    Text(String),
}

impl NumericCode {
    fn read<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u8, Error = CoreError>,
    {
        let value = match NumericCode::deserialize(deserializer)? {
            NumericCode::Number(n) => n,
            NumericCode::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| de::Error::custom(format!("invalid numeric code: {s}")))?,
        };
        T::try_from(value).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for PromptType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        NumericCode::read(deserializer)
    }
}

impl<'de> Deserialize<'de> for PromptAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        NumericCode::read(deserializer)
    }
}

impl TryFrom<u8> for PromptType {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PromptType::AlwaysShow),
            1 => Ok(PromptType::ReadingOnly),
            2 => Ok(PromptType::ComposingOnly),
            other => Err(CoreError::validation(format!("invalid prompt type: {other}"))),
        }
    }
}

impl From<PromptType> for u8 {
    fn from(value: PromptType) -> Self {
        match value {
            PromptType::AlwaysShow => 0,
            PromptType::ReadingOnly => 1,
            PromptType::ComposingOnly => 2,
        }
    }
}

impl TryFrom<u8> for PromptAction {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PromptAction::Close),
            1 => Ok(PromptAction::Reply),
            2 => Ok(PromptAction::ReplaceText),
            other => Err(CoreError::validation(format!(
                "invalid prompt action: {other}"
            ))),
        }
    }
}

impl From<PromptAction> for u8 {
    fn from(value: PromptAction) -> Self {
        match value {
            PromptAction::Close => 0,
            PromptAction::Reply => 1,
            PromptAction::ReplaceText => 2,
        }
    }
}

/// Accept `true`/`false` as well as the `0`/`1` integers of stored preferences.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(u8),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Number(n) => n != 0,
    })
}

/// A prompt the user can invoke on a mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Stable identifier (e.g. `prompt_reply`)
    pub id: String,
    /// Label shown in menus and in the launcher
    pub name: String,
    /// Prompt text, may contain `{%placeholder%}` tokens
    pub text: String,
    /// Where the prompt is offered
    #[serde(rename = "type")]
    pub prompt_type: PromptType,
    /// What to do with the answer
    pub action: PromptAction,
    /// Requires a selection in the originating document
    #[serde(default, deserialize_with = "flag")]
    pub need_selected: bool,
    /// Wants the current identity's signature
    #[serde(default, deserialize_with = "flag")]
    pub need_signature: bool,
    /// Asks the user for free text before sending
    #[serde(default, deserialize_with = "flag")]
    pub need_custom_text: bool,
}

impl PromptTemplate {
    fn builtin(
        id: &str,
        name: &str,
        text: &str,
        prompt_type: PromptType,
        action: PromptAction,
        need_selected: bool,
        need_signature: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            text: text.to_string(),
            prompt_type,
            action,
            need_selected,
            need_signature,
            need_custom_text: false,
        }
    }

    fn asking_custom_text(mut self) -> Self {
        self.need_custom_text = true;
        self
    }

    /// Whether this prompt is offered in a tab of the given kind.
    pub fn is_visible_in(&self, tab: TabKind) -> bool {
        match tab {
            TabKind::Any => true,
            TabKind::Reading => self.prompt_type != PromptType::ComposingOnly,
            TabKind::Composing => self.prompt_type != PromptType::ReadingOnly,
        }
    }
}

/// The built-in prompt set.
pub fn default_prompts() -> Vec<PromptTemplate> {
    use PromptAction::*;
    use PromptType::*;

    vec![
        PromptTemplate::builtin(
            "prompt_reply",
            "Reply",
            "Reply to the following email.",
            ReadingOnly,
            Reply,
            false,
            true,
        ),
        PromptTemplate::builtin(
            "prompt_rewrite_polite",
            "Rewrite polite",
            "Rewrite the following text to be more polite. Reply with only the re-written text and with no extra comments or other text.",
            ComposingOnly,
            ReplaceText,
            true,
            false,
        ),
        PromptTemplate::builtin(
            "prompt_rewrite_formal",
            "Rewrite formal",
            "Rewrite the following text to be more formal. Reply with only the re-written text and with no extra comments or other text.",
            ComposingOnly,
            ReplaceText,
            true,
            false,
        ),
        PromptTemplate::builtin(
            "prompt_classify",
            "Classify",
            "Classify the following text in terms of Politeness, Warmth, Formality, Assertiveness, Offensiveness giving a percentage for each category. Reply with only the category and score with no extra comments or other text.",
            AlwaysShow,
            Close,
            false,
            false,
        ),
        PromptTemplate::builtin(
            "prompt_summarize_this",
            "Summarize this",
            "Summarize the following email into a bullet point list.",
            AlwaysShow,
            Close,
            false,
            false,
        ),
        PromptTemplate::builtin(
            "prompt_translate_this",
            "Translate this",
            "Translate the following email in {%additional_text%}:",
            AlwaysShow,
            Close,
            false,
            false,
        )
        .asking_custom_text(),
        PromptTemplate::builtin(
            "prompt_this",
            "Prompt this",
            "Reply with only the needed text and with no extra comments or other text.",
            ComposingOnly,
            ReplaceText,
            true,
            false,
        ),
    ]
}

/// Lay user-edited copies over `defaults`: same id replaces, new ids are appended.
pub fn merge_prompts(
    defaults: Vec<PromptTemplate>,
    custom: &[PromptTemplate],
) -> Vec<PromptTemplate> {
    let mut merged = defaults;
    for prompt in custom {
        match merged.iter_mut().find(|p| p.id == prompt.id) {
            Some(existing) => *existing = prompt.clone(),
            None => merged.push(prompt.clone()),
        }
    }
    merged
}

/// Kind of tab the launcher was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabKind {
    /// No filtering
    Any,
    /// Mail display tab
    Reading,
    /// Compose window
    Composing,
}

/// Prompts offered in a tab of the given kind, order preserved.
pub fn filter_prompts_for_tab(prompts: &[PromptTemplate], tab: TabKind) -> Vec<PromptTemplate> {
    prompts
        .iter()
        .filter(|p| p.is_visible_in(tab))
        .cloned()
        .collect()
}

/// Shortcut keys for the first launcher results, in order.
const SHORTCUT_KEYS: [char; 10] = ['1', '2', '3', '4', '5', '6', '7', '8', '9', '0'];

/// One launcher search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMatch {
    pub id: String,
    /// Label as displayed, prefixed with the shortcut key when there is one
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<char>,
}

/// Case-insensitive substring search over prompt names.
///
/// The first ten matches are numbered `1`..`9`, `0` so they can be picked
/// with a single key press.
pub fn search_prompts(prompts: &[PromptTemplate], query: &str) -> Vec<PromptMatch> {
    let needle = query.trim().to_lowercase();
    prompts
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .enumerate()
        .map(|(index, p)| {
            let shortcut = SHORTCUT_KEYS.get(index).copied();
            let label = match shortcut {
                Some(key) => format!("{}. {}", key, p.name),
                None => p.name.clone(),
            };
            PromptMatch {
                id: p.id.clone(),
                label,
                shortcut,
            }
        })
        .collect()
}

/// Pick a launcher result by its shortcut key.
pub fn select_by_shortcut(matches: &[PromptMatch], key: char) -> Option<&PromptMatch> {
    matches.iter().find(|m| m.shortcut == Some(key))
}

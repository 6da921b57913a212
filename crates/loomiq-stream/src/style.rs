//! Display styling for log lines and message cleanup.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::EventKind;

/// Color category of a log line. Renderers map it to their own palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Gray,
    Blue,
    Purple,
    Yellow,
    Green,
    Red,
}

/// Glyph, tone and short label for one event kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct LineStyle {
    pub icon: &'static str,
    pub tone: Tone,
    pub label: &'static str,
}

impl LineStyle {
    const fn new(icon: &'static str, tone: Tone, label: &'static str) -> Self {
        Self { icon, tone, label }
    }
}

/// Style used for tags the client does not know.
pub const FALLBACK_STYLE: LineStyle = LineStyle::new("•", Tone::Gray, "Event");

/// Looks up the static style for `kind`.
pub fn style_for(kind: &EventKind) -> LineStyle {
    match kind {
        EventKind::Connected => LineStyle::new("🔌", Tone::Gray, "Connected"),
        EventKind::TaskAssigned => LineStyle::new("🤖", Tone::Blue, "Assigned"),
        EventKind::CollaborationStarted => LineStyle::new("🤝", Tone::Purple, "Collaborating"),
        EventKind::StepStarted => LineStyle::new("▶", Tone::Yellow, "Step"),
        EventKind::StepCompleted => LineStyle::new("✓", Tone::Green, "Step done"),
        EventKind::StepFailed => LineStyle::new("✗", Tone::Red, "Step failed"),
        EventKind::TaskCompleted => LineStyle::new("🎉", Tone::Green, "Done"),
        EventKind::TaskFailed => LineStyle::new("💥", Tone::Red, "Failed"),
        EventKind::TaskError => LineStyle::new("⚠", Tone::Red, "Error"),
        EventKind::Unknown(_) => FALLBACK_STYLE,
    }
}

// One leading glyph from the style table (optionally followed by a variation
// selector), or a stray variation selector on its own.
static LEADING_GLYPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[\x{25B6}\x{2713}\x{2717}\x{26A0}\x{1F50C}\x{1F916}\x{1F91D}\x{1F389}\x{1F4A5}]\x{FE0F}?|\x{FE0F})\s*",
    )
    .expect("leading glyph pattern is valid")
});

/// Strips one decorative leading glyph and trims the rest.
///
/// The glyph is already rendered from the style table, so the backend's copy
/// in the text is dropped whatever the event kind.
pub fn clean_message(raw: &str) -> String {
    LEADING_GLYPH.replace(raw, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_known_leading_glyph() {
        assert_eq!(clean_message("🤖 Agent selected"), "Agent selected");
        assert_eq!(clean_message("▶Step 2: compile"), "Step 2: compile");
        assert_eq!(clean_message("🎉   All done  "), "All done");
    }

    #[test]
    fn strips_glyph_with_variation_selector() {
        assert_eq!(clean_message("⚠\u{FE0F} Timeout"), "Timeout");
    }

    #[test]
    fn leaves_plain_messages_alone() {
        assert_eq!(clean_message("Agent selected"), "Agent selected");
        assert_eq!(clean_message("  padded  "), "padded");
    }

    #[test]
    fn strips_only_one_glyph_and_only_at_start() {
        assert_eq!(clean_message("✓ ✓ twice"), "✓ twice");
        assert_eq!(clean_message("done ✓"), "done ✓");
    }

    #[test]
    fn unrecognized_emoji_is_kept() {
        assert_eq!(clean_message("🚀 Launch"), "🚀 Launch");
    }

    #[test]
    fn glyph_is_stripped_regardless_of_event_kind() {
        // the message glyph need not match the event's own icon
        assert_eq!(clean_message("💥 Step blew up"), "Step blew up");
    }

    #[test]
    fn unknown_kind_uses_fallback() {
        let style = style_for(&EventKind::Unknown("some:future:event".into()));
        assert_eq!(style, FALLBACK_STYLE);
        assert_eq!(style.icon, "•");
        assert_eq!(style.tone, Tone::Gray);
    }

    #[test]
    fn terminal_kinds_have_distinct_styles() {
        assert_eq!(style_for(&EventKind::TaskCompleted).tone, Tone::Green);
        assert_eq!(style_for(&EventKind::TaskFailed).tone, Tone::Red);
        assert_eq!(style_for(&EventKind::TaskError).icon, "⚠");
    }
}

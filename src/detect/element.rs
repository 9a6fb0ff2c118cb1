use serde::{Deserialize, Serialize};

/// Structural description of a DOM node, captured by the host-side plumbing.
///
/// All fields are optional in spirit: whatever the capture layer could not
/// read is left empty/None and simply contributes no signal. `iframe_src`
/// stays None for cross-origin frames whose source is unreadable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementSnapshot {
    /// Lowercase tag name ("div", "iframe", "body", ...).
    pub tag: String,
    pub id: String,
    pub classes: Vec<String>,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    /// data-* attributes as (name, value) pairs, names include the prefix.
    pub data_attributes: Vec<(String, String)>,
    /// Visible text content of the subtree.
    pub text: String,
    pub has_input_field: bool,
    pub has_message_list: bool,
    pub has_send_button: bool,
    /// False when the element has no layout box.
    pub visible: bool,
    /// Element height divided by viewport height.
    pub viewport_height_fraction: f32,
    pub iframe_src: Option<String>,
    /// URL of the page hosting the element.
    pub source_url: String,
}

impl ElementSnapshot {
    /// Structural identity used to deduplicate observations of the same
    /// widget. Deliberately excludes discovery time so re-observation of an
    /// element resolves to the already-registered bot.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}#{}.{}",
            self.tag.to_lowercase(),
            self.id.to_lowercase(),
            self.classes.join(".").to_lowercase()
        )
    }

    pub fn class_attr(&self) -> String {
        self.classes.join(" ").to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_across_observations() {
        let snapshot = ElementSnapshot {
            tag: "DIV".into(),
            id: "chat-widget".into(),
            classes: vec!["chat".into(), "open".into()],
            ..Default::default()
        };
        assert_eq!(snapshot.fingerprint(), snapshot.clone().fingerprint());
        assert_eq!(snapshot.fingerprint(), "div#chat-widget.chat.open");
    }
}

use crate::detect::element::ElementSnapshot;
use crate::domain::BotCategory;

/// Phrases that indicate a conversational widget when they show up in
/// attributes or visible text.
const BOT_INDICATORS: &[&str] = &[
    "chatbot",
    "ai assistant",
    "virtual assistant",
    "bot",
    "ai chat",
    "live chat",
    "chat with us",
    "support chat",
];

/// Minimum accumulated score before an element counts as a bot. Tuned above
/// every single weak signal so a detection needs either one strong
/// structural/attribute signal or at least two independent categories.
pub const BOT_SCORE_THRESHOLD: i32 = 12;

const DATA_ATTRIBUTE_SIGNAL: i32 = 15;
const DATA_VALUE_KEYWORD_SIGNAL: i32 = 10;
const ATTRIBUTE_KEYWORD_SIGNAL: i32 = 8;
const TEXT_KEYWORD_SIGNAL: i32 = 3;
const CHAT_SHAPE_SIGNAL: i32 = 12;
const LABELED_ROLE_SIGNAL: i32 = 10;
const UNLABELED_ROLE_SIGNAL: i32 = 3;
const IFRAME_SOURCE_SIGNAL: i32 = 15;
const CHAT_NAME_SIGNAL: i32 = 8;
const PAGE_CONTAINER_PENALTY: i32 = -15;
const TALL_BLOCK_PENALTY: i32 = -10;

/// Fraction of the viewport height above which a plain block container is
/// treated as a page section rather than a widget.
const TALL_BLOCK_FRACTION: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_bot: bool,
    pub score: i32,
    pub category: BotCategory,
}

/// Scores a structural snapshot with weighted signal accumulation.
///
/// Pure over the snapshot: no side effects, deterministic, and absent
/// attributes contribute nothing. Registration and deduplication of
/// detected bots live in the conversation tracker.
pub fn classify(element: &ElementSnapshot) -> Classification {
    let score = score_element(element);
    Classification {
        is_bot: score >= BOT_SCORE_THRESHOLD,
        score,
        category: infer_category(element),
    }
}

fn score_element(element: &ElementSnapshot) -> i32 {
    let tag = element.tag.to_lowercase();

    // Elements without a layout box cause false positives and are never
    // interactive widgets; the document body is exempt because it reports
    // no offset parent.
    if !element.visible && tag != "body" {
        return 0;
    }

    let mut score = 0;
    let id = element.id.to_lowercase();
    let class_attr = element.class_attr();
    let aria_label = element
        .aria_label
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let text = element.text.to_lowercase();

    if element
        .data_attributes
        .iter()
        .any(|(name, _)| matches!(name.as_str(), "data-bot" | "data-chatbot" | "data-chat"))
    {
        score += DATA_ATTRIBUTE_SIGNAL;
    }

    let data_values = element
        .data_attributes
        .iter()
        .map(|(_, value)| value.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let named_attrs = format!("{class_attr} {id} {aria_label}");
    for indicator in BOT_INDICATORS {
        if data_values.contains(indicator) {
            score += DATA_VALUE_KEYWORD_SIGNAL;
        }
        if named_attrs.contains(indicator) {
            score += ATTRIBUTE_KEYWORD_SIGNAL;
        }
        // Low weight: incidental mentions of "bot" in page copy are common.
        if text.contains(indicator) {
            score += TEXT_KEYWORD_SIGNAL;
        }
    }

    if element.has_input_field && (element.has_message_list || element.has_send_button) {
        score += CHAT_SHAPE_SIGNAL;
    }

    if let Some(role) = element.role.as_deref() {
        if matches!(
            role.to_lowercase().as_str(),
            "dialog" | "complementary" | "application" | "form"
        ) {
            if aria_label.contains("chat") || aria_label.contains("bot") {
                score += LABELED_ROLE_SIGNAL;
            } else {
                score += UNLABELED_ROLE_SIGNAL;
            }
        }
    }

    if tag == "iframe" {
        // A missing src means the frame was cross-origin and unreadable;
        // that contributes nothing rather than failing.
        if let Some(src) = element.iframe_src.as_deref() {
            let src = src.to_lowercase();
            if src.contains("bot") || src.contains("chat") || src.contains("widget") {
                score += IFRAME_SOURCE_SIGNAL;
            }
        }
    }

    if id.contains("chat") || class_attr.contains("chat") {
        score += CHAT_NAME_SIGNAL;
    }

    if tag == "body" || tag == "main" {
        score += PAGE_CONTAINER_PENALTY;
    } else if is_block_container(&tag) && element.viewport_height_fraction >= TALL_BLOCK_FRACTION {
        score += TALL_BLOCK_PENALTY;
    }

    score
}

fn is_block_container(tag: &str) -> bool {
    matches!(tag, "div" | "section" | "article" | "aside")
}

/// Keyword buckets over combined text/class/id; the first bucket that
/// matches wins, in priority order.
fn infer_category(element: &ElementSnapshot) -> BotCategory {
    let haystack = format!(
        "{} {} {}",
        element.text.to_lowercase(),
        element.class_attr(),
        element.id.to_lowercase()
    );

    const BUCKETS: &[(BotCategory, &[&str])] = &[
        (
            BotCategory::CustomerService,
            &["customer service", "support", "helpdesk", "help desk"],
        ),
        (BotCategory::SalesMarketing, &["sales", "marketing"]),
        (BotCategory::GeneralAssistant, &["help", "assistant"]),
        (BotCategory::ChatBot, &["chat", "bot"]),
    ];

    for (category, keywords) in BUCKETS {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return *category;
        }
    }
    BotCategory::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(tag: &str) -> ElementSnapshot {
        ElementSnapshot {
            tag: tag.to_string(),
            visible: true,
            ..Default::default()
        }
    }

    #[test]
    fn data_attribute_with_chat_shape_is_a_bot() {
        let mut element = visible("div");
        element.data_attributes = vec![("data-chatbot".into(), "true".into())];
        element.has_input_field = true;
        element.has_send_button = true;

        let result = classify(&element);
        assert!(result.score >= 27);
        assert!(result.is_bot);
    }

    #[test]
    fn single_weak_signal_is_not_enough() {
        let mut element = visible("div");
        element.text = "our bot is great".into();

        let result = classify(&element);
        assert!(!result.is_bot, "score was {}", result.score);
    }

    #[test]
    fn invisible_elements_score_zero() {
        let mut element = visible("div");
        element.visible = false;
        element.data_attributes = vec![("data-chatbot".into(), "true".into())];
        element.has_input_field = true;
        element.has_send_button = true;

        let result = classify(&element);
        assert_eq!(result.score, 0);
        assert!(!result.is_bot);
    }

    #[test]
    fn page_containers_are_penalized() {
        let mut body = visible("body");
        body.has_input_field = true;
        body.has_send_button = true;
        assert!(!classify(&body).is_bot);

        let mut tall = visible("div");
        tall.viewport_height_fraction = 0.95;
        tall.has_input_field = true;
        tall.has_send_button = true;
        assert!(!classify(&tall).is_bot);
    }

    #[test]
    fn iframe_source_keyword_is_a_strong_signal() {
        let mut frame = visible("iframe");
        frame.iframe_src = Some("https://cdn.example.com/chat-widget.html".into());
        assert!(classify(&frame).is_bot);

        // Unreadable cross-origin source contributes nothing.
        frame.iframe_src = None;
        assert_eq!(classify(&frame).score, 0);
    }

    #[test]
    fn labeled_dialog_role_with_chat_class_is_a_bot() {
        let mut element = visible("div");
        element.role = Some("dialog".into());
        element.aria_label = Some("Chat with support".into());
        element.classes = vec!["chat-panel".into()];

        let result = classify(&element);
        // +10 labeled role, +8 literal "chat" in the class list.
        assert_eq!(result.score, 18);
        assert!(result.is_bot);
    }

    #[test]
    fn classification_is_deterministic() {
        let mut element = visible("div");
        element.classes = vec!["chatbot-widget".into()];
        element.has_input_field = true;
        element.has_message_list = true;

        let first = classify(&element);
        for _ in 0..10 {
            assert_eq!(classify(&element), first);
        }
    }

    #[test]
    fn category_buckets_match_in_priority_order() {
        let mut element = visible("div");
        element.text = "customer service chat".into();
        assert_eq!(classify(&element).category, BotCategory::CustomerService);

        element.text = "sales inquiries welcome".into();
        assert_eq!(classify(&element).category, BotCategory::SalesMarketing);

        element.text = "your virtual assistant".into();
        assert_eq!(classify(&element).category, BotCategory::GeneralAssistant);

        element.text = "chat now".into();
        assert_eq!(classify(&element).category, BotCategory::ChatBot);

        element.text = "nothing relevant".into();
        assert_eq!(classify(&element).category, BotCategory::Unknown);
    }
}

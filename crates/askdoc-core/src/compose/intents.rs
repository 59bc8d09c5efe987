//! Conversational intent tables.
//!
//! Both tables are ordered lists of `(name, pattern, reply)` rules matched
//! against the lowercased query; the first matching rule wins. Replies may
//! contain `{org}`, replaced with the configured organization name.
//!
//! [`INTENTS`] is consulted before any retrieval and short-circuits the
//! query. [`HINTS`] is consulted only after retrieval found nothing.

use once_cell::sync::Lazy;
use regex::Regex;

/// One conversational rule.
pub struct IntentRule {
    pub name: &'static str,
    pattern: Regex,
    reply: &'static str,
}

impl IntentRule {
    fn new(name: &'static str, pattern: &str, reply: &'static str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("invalid intent pattern"),
            reply,
        }
    }

    /// Whether the rule fires for an already-lowercased query.
    pub fn matches(&self, query_lower: &str) -> bool {
        self.pattern.is_match(query_lower)
    }

    pub fn render(&self, organization: &str) -> String {
        self.reply.replace("{org}", organization)
    }
}

/// Canned replies that answer a query outright.
pub static INTENTS: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    vec![
        IntentRule::new(
            "greeting",
            r"\b(hello|hi|hey|good (morning|afternoon|evening))\b",
            "Hello! I'm here to help you with information about {org} and answer your questions. \
             What would you like to know?",
        ),
        IntentRule::new(
            "how_are_you",
            r"\b(how are you|how do you do|what'?s up)\b",
            "I'm doing great, thank you for asking! I'm ready to help you with any questions \
             about {org} or general inquiries. How can I assist you today?",
        ),
        IntentRule::new(
            "capabilities",
            r"\b(what can you do|what do you do|help me|capabilities)\b",
            "I can help you with:\n\
             • Information about {org} policies, procedures, and guidelines\n\
             • General questions and conversations\n\
             • Details about products, services, and support\n\
             • Workplace culture and employee information\n\n\
             Just ask me anything!",
        ),
        IntentRule::new(
            "thanks",
            r"\b(thanks?|appreciate)",
            "You're very welcome! I'm happy to help. Feel free to ask me anything else you'd \
             like to know.",
        ),
        IntentRule::new(
            "farewell",
            r"\b(bye|goodbye|see you|farewell)\b",
            "Goodbye! It was great chatting with you. Feel free to come back anytime if you \
             have more questions!",
        ),
        IntentRule::new(
            "identity",
            r"\b(who are you|what are you|tell me about yourself)\b",
            "I'm the {org} assistant! I'm here to help you find information about policies, \
             products, and services from the documents I've been given. I can also have \
             general conversations. How can I help you today?",
        ),
        IntentRule::new(
            "time",
            r"\b(what time is it|what('?s| is) the (time|date)|what day is (it|today)|today'?s date|current (time|date))\b",
            "I can see you're asking about the time or date. I don't have real-time \
             capabilities, but I can help you with {org}'s working hours or other \
             time-related policies. What specifically would you like to know?",
        ),
        IntentRule::new(
            "weather",
            r"\bweather\b",
            "I don't have access to current weather information, but I can help you with \
             {org}-related questions or other topics. Is there something you'd like to know?",
        ),
    ]
});

/// Replies used when retrieval found nothing, before the generic fallback.
pub static HINTS: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    vec![IntentRule::new(
        "domain_topics",
        r"\b(company|policy|policies|work|employee|employees|office|support)\b",
        "I'd be happy to help with information about {org}! I can tell you about policies \
         including working hours, office locations, leave, remote work, workplace culture, \
         and code of conduct. What specific policy or information would you like to know about?",
    )]
});

/// Words that mark a query as a request for information.
const INFO_SEEKING: &[&str] = &[
    "what", "how", "when", "where", "why", "who", "which", "tell me", "explain", "describe",
];

/// Reply for information-seeking queries with no matching content.
pub const NO_MATCH_REPLY: &str = "I don't have specific information about that in my knowledge \
     base, but I'm happy to help in other ways! You could try asking about {org} policies, \
     procedures, or general questions. What else would you like to know?";

/// Reply for everything else.
pub const GENERIC_REPLY: &str = "That's an interesting question! While I specialize in helping \
     with {org}-related information, I'm happy to chat. Could you tell me more about what \
     you're looking for?";

/// Reply when the knowledge base holds no documents.
pub const EMPTY_KB_REPLY: &str = "I don't have any specific documents loaded right now, but I'm \
     still here to help! You can ask me general questions or about {org}. What would you like \
     to know?";

/// Reply to an empty query.
pub const EMPTY_QUERY_REPLY: &str = "Please ask a question.";

/// First rule in `rules` matching `query`, case-insensitively.
pub fn first_match<'a>(rules: &'a [IntentRule], query: &str) -> Option<&'a IntentRule> {
    let lower = query.to_lowercase();
    rules.iter().find(|r| r.matches(&lower))
}

pub fn is_info_seeking(query: &str) -> bool {
    let lower = query.to_lowercase();
    INFO_SEEKING.iter().any(|w| lower.contains(w))
}

/// The reply given when no content answered the query.
pub fn fallback_reply(query: &str, organization: &str) -> String {
    if let Some(hint) = first_match(&HINTS, query) {
        return hint.render(organization);
    }
    let template = if is_info_seeking(query) {
        NO_MATCH_REPLY
    } else {
        GENERIC_REPLY
    };
    template.replace("{org}", organization)
}

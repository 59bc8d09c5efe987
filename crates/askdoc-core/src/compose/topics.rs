//! Topic-structured formatting of retrieved text.
//!
//! A [`Topic`] applies to a query when one of its `triggers` occurs in the
//! query and at least one sentence of the retrieved text contains one of
//! its `markers`. The matching sentences become the bullets of that
//! topic's section. All matching is on lowercased text.

use super::extract::split_sentences;

/// One entry of the topic table.
pub struct Topic {
    pub key: &'static str,
    /// Section heading, e.g. `"🕘 WORKING HOURS"`.
    pub title: &'static str,
    /// Short label used in the policy overview.
    pub label: &'static str,
    triggers: &'static [&'static str],
    markers: &'static [&'static str],
    footer: &'static str,
}

/// Bullets per section.
const MAX_BULLETS: usize = 5;

pub static TOPICS: &[Topic] = &[
    Topic {
        key: "working_hours",
        title: "🕘 WORKING HOURS",
        label: "Working Hours",
        triggers: &["working hours", "work hours", "work time", "office hours", "timings"],
        markers: &["working hours", "work hours", "office hours", "arrival", "hours"],
        footer: "Questions about schedule flexibility?",
    },
    Topic {
        key: "office_locations",
        title: "🏢 OFFICE LOCATIONS",
        label: "Office Locations",
        triggers: &["location", "located", "address", "where is the office", "where are the offices"],
        markers: &["office location", "located", "headquarter", "hub", "offices"],
        footer: "Need the address of a specific office?",
    },
    Topic {
        key: "leave",
        title: "🏖️ LEAVE POLICY",
        label: "Leave Policy",
        triggers: &["leave", "vacation", "holiday", "time off", "sick"],
        markers: &["leave", "holiday", "vacation", "sick"],
        footer: "Questions about leave approval or procedures?",
    },
    Topic {
        key: "remote_work",
        title: "🏠 REMOTE WORK POLICY",
        label: "Remote Work",
        triggers: &["remote", "work from home", "wfh", "hybrid"],
        markers: &["remote", "work from home", "hybrid"],
        footer: "Need details about remote work setup?",
    },
    Topic {
        key: "culture",
        title: "🤝 WORKPLACE CULTURE & VALUES",
        label: "Core Values",
        triggers: &["culture", "values", "conduct", "behavior", "behaviour", "ethics"],
        markers: &["respect", "integrity", "values", "culture", "conduct", "harassment", "discrimination"],
        footer: "Want to know more about workplace guidelines?",
    },
    Topic {
        key: "dress_code",
        title: "👔 DRESS CODE",
        label: "Dress Code",
        triggers: &["dress", "attire"],
        markers: &["dress", "attire", "clothing"],
        footer: "Unsure what counts as appropriate attire? Just ask!",
    },
    Topic {
        key: "communication",
        title: "💬 COMMUNICATION",
        label: "Communication",
        triggers: &["communication", "meeting", "email"],
        markers: &["communicat", "meeting", "email", "message"],
        footer: "Need the right channel for a specific concern?",
    },
    Topic {
        key: "health_safety",
        title: "🛡️ HEALTH & SAFETY",
        label: "Health & Safety",
        triggers: &["safety", "health"],
        markers: &["safety", "hazard", "emergency", "health"],
        footer: "Spotted a hazard? Report it right away.",
    },
];

impl Topic {
    fn triggered_by(&self, query_lower: &str) -> bool {
        self.triggers.iter().any(|t| query_lower.contains(t))
    }

    fn marks(&self, sentence_lower: &str) -> bool {
        self.markers.iter().any(|m| sentence_lower.contains(m))
    }

    /// Sentences of `text` that mention this topic, in text order.
    fn sentences<'t>(&self, text: &'t str) -> Vec<&'t str> {
        split_sentences(text)
            .into_iter()
            .filter(|s| self.marks(&s.to_lowercase()))
            .take(MAX_BULLETS)
            .collect()
    }
}

fn bullets(sentences: &[&str]) -> String {
    sentences
        .iter()
        .map(|s| format!("• {}.", s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format `text` as topic sections for `query`.
///
/// Returns `None` when no topic applies and the query is not a general
/// policy question; the caller then falls back to extractive selection.
/// `policy_query` says whether the query is policy-class.
pub fn format_topics(query: &str, text: &str, organization: &str, policy_query: bool) -> Option<String> {
    let query_lower = query.to_lowercase();

    let triggered: Vec<&Topic> = TOPICS.iter().filter(|t| t.triggered_by(&query_lower)).collect();
    let sections: Vec<(&Topic, Vec<&str>)> = triggered
        .iter()
        .map(|t| (*t, t.sentences(text)))
        .filter(|(_, s)| !s.is_empty())
        .collect();

    match sections.as_slice() {
        [(topic, sentences)] => Some(format!(
            "{}\n\n{}\n\n💡 {}",
            topic.title,
            bullets(sentences),
            topic.footer
        )),
        [] if policy_query && triggered.is_empty() => policy_overview(text, organization),
        [] => None,
        several => {
            let body = several
                .iter()
                .map(|(topic, sentences)| format!("{}\n{}", topic.title, bullets(sentences)))
                .collect::<Vec<_>>()
                .join("\n\n");
            Some(format!(
                "📋 {} INFORMATION\n\n{}\n\n💡 Need specific details about any policy? Just ask!",
                organization.to_uppercase(),
                body
            ))
        }
    }
}

/// One `**Label:** first sentence` line per topic the text covers.
fn policy_overview(text: &str, organization: &str) -> Option<String> {
    let lines: Vec<String> = TOPICS
        .iter()
        .filter_map(|t| {
            t.sentences(text)
                .first()
                .map(|s| format!("**{}:** {}.", t.label, s))
        })
        .collect();

    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Here are {}'s key policies:\n\n{}\n\nWould you like details about any specific policy?",
        organization,
        lines.join("\n")
    ))
}

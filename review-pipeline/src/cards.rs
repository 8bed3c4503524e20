use common::{
    storage::types::pending_submission::{PendingSubmission, SubmissionPayload},
    utils::config::ReviewSettings,
};

use crate::messaging::{CardField, ReviewCard};

pub const COLOR_PENDING: u32 = 0x00F1_C40F;
pub const COLOR_APPROVED: u32 = 0x002E_CC71;
pub const COLOR_REJECTED: u32 = 0x00E7_4C3C;

const PREVIEW_CHARS: usize = 500;

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

fn field(name: &str, value: impl Into<String>, inline: bool) -> CardField {
    let value = value.into();
    CardField {
        name: name.to_string(),
        value: if value.trim().is_empty() {
            "N/A".to_string()
        } else {
            value
        },
        inline,
    }
}

fn payload_fields(payload: &SubmissionPayload) -> Vec<CardField> {
    match payload {
        SubmissionPayload::GeneralKnowledge(p) => vec![
            field("Category", p.category_name.as_str(), true),
            field("Title", p.title.as_str(), false),
            field("Content preview", preview(&p.content_text), false),
        ],
        SubmissionPayload::CommunityMember(p) => vec![
            field("Category", "Community member", true),
            field("Name", p.name.as_str(), false),
            field(
                "Content preview",
                preview(&format!(
                    "Personality: {}\nBackground: {}\nPreferences: {}",
                    p.personality, p.background, p.preferences
                )),
                false,
            ),
        ],
        SubmissionPayload::WorkEvent(p) => {
            let mut fields = vec![
                field("Event name", p.name.as_str(), false),
                field("Description", preview(&p.description), false),
                field(
                    "Reward range",
                    format!("{} - {} coins", p.reward_range_min, p.reward_range_max),
                    true,
                ),
            ];
            if let Some(good) = &p.good_event_description {
                fields.push(field("Good outcome", good.as_str(), false));
            }
            if let Some(bad) = &p.bad_event_description {
                fields.push(field("Bad outcome", bad.as_str(), false));
            }
            fields
        }
    }
}

fn base_card(submission: &PendingSubmission, footer_rules: &str) -> ReviewCard {
    ReviewCard {
        title: String::new(),
        description: String::new(),
        fields: payload_fields(&submission.payload),
        footer: format!(
            "Proposer: {} | Submission ID: {}{}",
            submission.proposer_id, submission.id, footer_rules
        ),
        color: COLOR_PENDING,
        timestamp: Some(submission.created_at),
    }
}

/// Card posted when the review opens.
pub fn review_card(submission: &PendingSubmission, settings: &ReviewSettings) -> ReviewCard {
    let rules = format!(
        " | {} min window, {} {} passes instantly, {} {} rejects",
        settings.review_duration_minutes,
        settings.instant_approval_threshold,
        settings.vote_emoji,
        settings.rejection_threshold,
        settings.reject_emoji
    );
    let title = match &submission.payload {
        SubmissionPayload::GeneralKnowledge(_) => "A new piece of knowledge is up for review",
        SubmissionPayload::CommunityMember(_) => "A new member card is up for review",
        SubmissionPayload::WorkEvent(_) => "A new work event is up for review",
    };

    ReviewCard {
        title: title.to_string(),
        description: format!(
            "React with {} to approve or {} to reject. With at least {} approvals by the deadline it passes.",
            settings.vote_emoji, settings.reject_emoji, settings.approval_threshold
        ),
        ..base_card(submission, &rules)
    }
}

pub fn approved_card(submission: &PendingSubmission) -> ReviewCard {
    let name = submission.payload.display_name();
    let description = match &submission.payload {
        SubmissionPayload::GeneralKnowledge(_) => {
            format!("The community agreed: **{name}** is now part of the knowledge base.")
        }
        SubmissionPayload::CommunityMember(_) => {
            format!("The community agreed: **{name}** now has a member card.")
        }
        SubmissionPayload::WorkEvent(_) => {
            format!("The community agreed: **{name}** joined the work event pool.")
        }
    };

    ReviewCard {
        title: "✅ Approved".to_string(),
        description,
        color: COLOR_APPROVED,
        ..base_card(submission, "")
    }
}

pub fn rejected_card(submission: &PendingSubmission, reason: &str) -> ReviewCard {
    ReviewCard {
        title: "❌ Not approved".to_string(),
        description: format!(
            "The submission **{}** did not pass review.\n**Reason:** {reason}",
            submission.payload.display_name()
        ),
        color: COLOR_REJECTED,
        ..base_card(submission, "")
    }
}

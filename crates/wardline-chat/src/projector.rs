use std::cmp::Reverse;
use std::sync::Arc;

use wardline_db::Database;
use wardline_types::api::ConversationSummary;
use wardline_types::models::Conversation;

use crate::blocking;
use crate::error::Result;

/// Badge text for an unread count: nothing at zero, capped at "9+".
pub fn unread_badge(unread: u32) -> Option<String> {
    match unread {
        0 => None,
        1..=9 => Some(unread.to_string()),
        _ => Some("9+".to_string()),
    }
}

/// Build the viewer's conversation list, most recent activity first.
///
/// Sorted here rather than in the query so the store needs no compound
/// index. Conversations without messages sort as timestamp zero, i.e. last.
pub fn project(viewer: &str, conversations: Vec<Conversation>) -> Vec<ConversationSummary> {
    let mut conversations: Vec<Conversation> =
        conversations.into_iter().filter(|c| c.has_participant(viewer)).collect();
    conversations.sort_by_key(|c| {
        Reverse(c.last_message.as_ref().map_or(0, |m| m.timestamp.timestamp_millis()))
    });

    conversations
        .into_iter()
        .map(|mut c| {
            let other_id = c.other_participant(viewer).unwrap_or_default().to_string();
            let unread = c.unread_for(viewer);
            ConversationSummary {
                other_profile: c.participant_profiles.remove(&other_id),
                chat_id: c.id,
                other_id,
                last_message: c.last_message,
                unread,
                badge: unread_badge(unread),
            }
        })
        .collect()
}

/// One-shot read of the projected list.
pub async fn conversation_list(db: &Arc<Database>, viewer: &str) -> Result<Vec<ConversationSummary>> {
    let viewer_id = viewer.to_string();
    let records = blocking(db, move |db| db.chats_for_user(&viewer_id)).await?;
    let conversations = records.into_iter().filter_map(|r| r.into_model()).collect();
    Ok(project(viewer, conversations))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};
    use wardline_types::models::{LastMessage, ParticipantProfile};

    use super::*;

    fn conversation(other: &str, last_at: Option<i64>, unread: u32) -> Conversation {
        let profile = |name: &str| ParticipantProfile {
            name: name.into(),
            surname: "Test".into(),
            role: "nurse".into(),
        };
        Conversation {
            id: crate::identity::chat_id("me", other),
            participants: ["me".into(), other.into()],
            participant_profiles: HashMap::from([
                ("me".to_string(), profile("Me")),
                (other.to_string(), profile(other)),
            ]),
            last_message: last_at.map(|ms| LastMessage {
                id: format!("m-{other}"),
                text: "hi".into(),
                sender_id: other.into(),
                timestamp: DateTime::<Utc>::from_timestamp_millis(ms).unwrap(),
                read: false,
            }),
            unread_counts: HashMap::from([("me".to_string(), unread), (other.to_string(), 0)]),
            created_at: DateTime::default(),
        }
    }

    #[test]
    fn newest_first_and_empty_last() {
        let list = project(
            "me",
            vec![
                conversation("t1", Some(1_000), 0),
                conversation("none", None, 0),
                conversation("t3", Some(3_000), 0),
                conversation("t2", Some(2_000), 0),
            ],
        );
        let order: Vec<_> = list.iter().map(|s| s.other_id.as_str()).collect();
        assert_eq!(order, ["t3", "t2", "t1", "none"]);
    }

    #[test]
    fn unread_and_badge_come_from_viewer_entry() {
        let list = project("me", vec![conversation("nurse", Some(5), 12)]);
        assert_eq!(list[0].unread, 12);
        assert_eq!(list[0].badge.as_deref(), Some("9+"));
        assert_eq!(list[0].other_profile.as_ref().unwrap().name, "nurse");
    }

    #[test]
    fn badge_thresholds() {
        assert_eq!(unread_badge(0), None);
        assert_eq!(unread_badge(1).as_deref(), Some("1"));
        assert_eq!(unread_badge(9).as_deref(), Some("9"));
        assert_eq!(unread_badge(10).as_deref(), Some("9+"));
    }
}

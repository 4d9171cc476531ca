use crate::domain::message::Message;
use std::collections::HashMap;
use std::fmt;

/// Identifies one directed conversation: every message from `sender` to `receiver`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    pub sender: String,
    pub receiver: String,
}

impl ConversationKey {
    #[must_use]
    pub fn of(message: &Message) -> Self {
        Self { sender: message.sender.clone(), receiver: message.receiver.clone() }
    }

    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.sender == message.sender && self.receiver == message.receiver
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.sender, self.receiver)
    }
}

/// A batch's messages for one conversation, ascending by `unix_timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationGroup {
    key: ConversationKey,
    messages: Vec<Message>,
}

impl ConversationGroup {
    #[must_use]
    pub const fn key(&self) -> &ConversationKey {
        &self.key
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Partitions `messages` into conversation groups.
///
/// Groups come out in order of first appearance; inside a group messages are
/// sorted by timestamp, equal timestamps keeping their input order.
#[must_use]
pub fn group_by_conversation<I>(messages: I) -> Vec<ConversationGroup>
where
    I: IntoIterator<Item = Message>,
{
    let mut groups: Vec<ConversationGroup> = Vec::new();
    let mut index: HashMap<ConversationKey, usize> = HashMap::new();

    for message in messages {
        let key = ConversationKey::of(&message);
        if let Some(&slot) = index.get(&key) {
            groups[slot].messages.push(message);
        } else {
            index.insert(key.clone(), groups.len());
            groups.push(ConversationGroup { key, messages: vec![message] });
        }
    }

    for group in &mut groups {
        group.messages.sort_by_key(|m| m.unix_timestamp);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageDraft;
    use time::UtcOffset;

    fn msg(id: &str, sender: &str, receiver: &str, minute: u8) -> Message {
        let draft = MessageDraft {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            scheduled_time: format!("2024-01-01T10:{minute:02}"),
            content: format!("body {id}"),
        };
        Message::from_draft(id.to_string(), draft, UtcOffset::UTC).expect("valid draft")
    }

    fn ids(group: &ConversationGroup) -> Vec<&str> {
        group.messages().iter().map(Message::id).collect()
    }

    #[test]
    fn test_groups_keep_first_appearance_order() {
        let groups = group_by_conversation(vec![
            msg("c1", "carol", "dave", 5),
            msg("a1", "alice", "bob", 3),
            msg("c2", "carol", "dave", 1),
            msg("a2", "alice", "bob", 2),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key().to_string(), "carol->dave");
        assert_eq!(ids(&groups[0]), vec!["c2", "c1"]);
        assert_eq!(ids(&groups[1]), vec!["a2", "a1"]);
    }

    #[test]
    fn test_direction_matters() {
        let groups = group_by_conversation(vec![msg("ab", "alice", "bob", 1), msg("ba", "bob", "alice", 2)]);

        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_equal_timestamps_are_stable() {
        let groups = group_by_conversation(vec![
            msg("x", "alice", "bob", 7),
            msg("y", "alice", "bob", 7),
            msg("z", "alice", "bob", 6),
        ]);

        assert_eq!(ids(&groups[0]), vec!["z", "x", "y"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_by_conversation(Vec::new()).is_empty());
    }
}

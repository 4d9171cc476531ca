use crate::domain::conversation::ConversationKey;
use crate::error::{AppError, Result};
use crate::services::dispatcher::Selection;
use serde::{Deserialize, Serialize};

/// Optional body of `POST /dispatch`. An empty body selects every unsent message.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
}

impl DispatchRequest {
    /// # Errors
    /// Returns `AppError::BadRequest` when ids and a conversation are both given, or
    /// only half of a conversation is given.
    pub fn into_selection(self) -> Result<Selection> {
        match (self.ids.is_empty(), self.sender, self.receiver) {
            (true, None, None) => Ok(Selection::AllUnsent),
            (false, None, None) => Ok(Selection::Ids(self.ids.into_iter().collect())),
            (true, Some(sender), Some(receiver)) => {
                Ok(Selection::Conversation(ConversationKey { sender, receiver }))
            }
            (false, _, _) => Err(AppError::BadRequest("select by ids or by conversation, not both".to_string())),
            (true, _, _) => Err(AppError::BadRequest("a conversation needs both sender and receiver".to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_from_request() {
        assert_eq!(DispatchRequest::default().into_selection().ok(), Some(Selection::AllUnsent));

        let by_ids = DispatchRequest { ids: vec!["a".to_string()], ..DispatchRequest::default() };
        assert!(matches!(by_ids.into_selection(), Ok(Selection::Ids(ids)) if ids.contains("a")));

        let half = DispatchRequest { sender: Some("alice".to_string()), ..DispatchRequest::default() };
        assert!(matches!(half.into_selection(), Err(AppError::BadRequest(_))));

        let both = DispatchRequest {
            ids: vec!["a".to_string()],
            sender: Some("alice".to_string()),
            receiver: Some("bob".to_string()),
        };
        assert!(matches!(both.into_selection(), Err(AppError::BadRequest(_))));
    }
}

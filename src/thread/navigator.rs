//! Regenerate, edit and branch selection requests.
//!
//! These only build requests for the store. The new branch itself appears
//! once the store reports it.

use crate::domain::{Checkpoint, Message, ThreadValues};
use crate::store::{CheckpointTarget, MessageMetadata, SubmitOptions, SubmitPayload};

use super::optimistic::Projection;

/// Request that resumes the run from `parent`, or from the root when `None`.
pub fn regenerate_request(parent: Option<Checkpoint>) -> SubmitOptions {
    SubmitOptions::values().with_checkpoint(CheckpointTarget::from(parent))
}

/// A human message resent with new text.
#[derive(Debug)]
pub struct EditRequest {
    pub payload: SubmitPayload,
    pub options: SubmitOptions,
    pub projection: Projection,
}

/// Build the request that replaces `original` with a message holding `text`.
///
/// The new message is submitted at the checkpoint before `original` first
/// appeared. Until the store confirms, the thread shows that earlier state
/// with the edited message in place of the original and nothing after it.
pub fn edit_request(meta: &MessageMetadata, original: &Message, text: &str) -> EditRequest {
    let edited = Message::human(text);

    let mut kept: Vec<Message> = meta
        .first_seen_state
        .as_ref()
        .map(|state| {
            let end = original
                .id()
                .and_then(|id| state.values.position(id))
                .unwrap_or(state.values.len());
            state.values.messages[..end].to_vec()
        })
        .unwrap_or_default();
    kept.push(edited.clone());
    let projected = ThreadValues::new(kept);

    EditRequest {
        payload: SubmitPayload::new(vec![edited]),
        options: regenerate_request(meta.parent_checkpoint().cloned()),
        projection: Projection::replace(projected),
    }
}

/// Position of a message's branch among its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSwitcher {
    pub index: usize,
    pub options: Vec<String>,
}

impl BranchSwitcher {
    pub fn has_alternatives(&self) -> bool {
        self.options.len() > 1
    }

    pub fn previous(&self) -> Option<&str> {
        self.index
            .checked_sub(1)
            .and_then(|i| self.options.get(i))
            .map(String::as_str)
    }

    pub fn next(&self) -> Option<&str> {
        self.options.get(self.index + 1).map(String::as_str)
    }
}

impl std::fmt::Display for BranchSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.index + 1, self.options.len())
    }
}

pub fn branch_switcher(meta: &MessageMetadata) -> Option<BranchSwitcher> {
    let branch = meta.branch.as_deref()?;
    let index = meta.branch_options.iter().position(|b| b == branch)?;
    Some(BranchSwitcher {
        index,
        options: meta.branch_options.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ThreadState;

    fn metadata(messages: Vec<Message>, parent: Option<&str>) -> MessageMetadata {
        MessageMetadata {
            branch: Some("b2".to_string()),
            branch_options: vec!["b1".to_string(), "b2".to_string(), "b3".to_string()],
            first_seen_state: Some(ThreadState {
                values: ThreadValues::new(messages),
                checkpoint: Checkpoint::new("b2"),
                parent_checkpoint: parent.map(Checkpoint::new),
            }),
        }
    }

    #[test]
    fn test_regenerate_targets_checkpoint_or_root() {
        let options = regenerate_request(Some(Checkpoint::new("c")));
        assert_eq!(options.checkpoint, CheckpointTarget::At(Checkpoint::new("c")));
        assert_eq!(regenerate_request(None).checkpoint, CheckpointTarget::Root);
    }

    #[test]
    fn test_edit_truncates_at_original() {
        let first = Message::human("a").with_id("1");
        let reply = Message::ai("b").with_id("2");
        let original = Message::human("c").with_id("3");
        let meta = metadata(vec![first, reply, original.clone()], Some("p"));

        let request = edit_request(&meta, &original, "changed");
        assert_eq!(request.payload.messages.len(), 1);
        assert_eq!(request.payload.messages[0].content_string(), "changed");
        assert_eq!(
            request.options.checkpoint,
            CheckpointTarget::At(Checkpoint::new("p"))
        );

        let shown = request.projection.apply(&ThreadValues::default());
        let texts: Vec<String> = shown.messages.iter().map(Message::content_string).collect();
        assert_eq!(texts, vec!["a", "b", "changed"]);
    }

    #[test]
    fn test_branch_switcher() {
        let meta = metadata(vec![], None);
        let switcher = branch_switcher(&meta).unwrap();
        assert_eq!(switcher.index, 1);
        assert_eq!(switcher.previous(), Some("b1"));
        assert_eq!(switcher.next(), Some("b3"));
        assert!(switcher.has_alternatives());
        assert_eq!(switcher.to_string(), "2 / 3");

        let lone = MessageMetadata {
            branch: None,
            branch_options: vec![],
            first_seen_state: None,
        };
        assert!(branch_switcher(&lone).is_none());
    }
}

use super::message::ConversationMessage;

/// A display unit: one message, or a run of consecutive tool messages.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageGroup<'a> {
    Single(&'a ConversationMessage),
    ToolChain(Vec<&'a ConversationMessage>),
}

impl<'a> MessageGroup<'a> {
    /// Messages of this group in log order.
    pub fn messages(&self) -> &[&'a ConversationMessage] {
        match self {
            MessageGroup::Single(message) => std::slice::from_ref(message),
            MessageGroup::ToolChain(messages) => messages,
        }
    }
}

/// Partitions the log into display groups, collapsing adjacent tool messages.
pub fn group_messages(messages: &[ConversationMessage]) -> Vec<MessageGroup<'_>> {
    let mut groups = Vec::new();
    let mut chain = Vec::new();

    for message in messages {
        if message.is_tool() {
            chain.push(message);
            continue;
        }
        if !chain.is_empty() {
            groups.push(MessageGroup::ToolChain(std::mem::take(&mut chain)));
        }
        groups.push(MessageGroup::Single(message));
    }
    if !chain.is_empty() {
        groups.push(MessageGroup::ToolChain(chain));
    }

    groups
}

/// Concatenates the groups back into the log they came from.
pub fn flatten_groups<'a>(groups: &[MessageGroup<'a>]) -> Vec<&'a ConversationMessage> {
    groups
        .iter()
        .flat_map(|group| group.messages().iter().copied())
        .collect()
}

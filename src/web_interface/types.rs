use std::fmt::Write;

use chrono::DateTime;
use serde::Serialize;

use crate::storage::JoinedMessage;

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Plain text listing of stored messages, one block per message, in the
/// order given.
pub fn render_messages_text(messages: &[JoinedMessage]) -> String {
    let mut out = String::new();
    for joined in messages {
        let message = &joined.message;
        let time = DateTime::from_timestamp(message.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| message.timestamp.to_string());
        let receiver = match (&joined.number, &joined.description) {
            (Some(number), Some(description)) if !description.is_empty() => {
                format!("{} ({})", number, description)
            }
            (Some(number), _) => number.clone(),
            (None, _) => message.imsi.clone(),
        };
        let _ = writeln!(out, "Time: {}", time);
        let _ = writeln!(out, "To:   {}", receiver);
        let _ = writeln!(out, "From: {}", message.sender);
        let _ = writeln!(out, "{}", message.content);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Message;

    fn joined(number: Option<&str>, description: Option<&str>) -> JoinedMessage {
        JoinedMessage {
            message: Message {
                id: 1,
                timestamp: 1_729_252_800,
                imsi: "262010000000001".into(),
                sender: "+31628870634".into(),
                content: "Your code is 1234".into(),
            },
            number: number.map(String::from),
            description: description.map(String::from),
        }
    }

    #[test]
    fn renders_registered_number() {
        let text = render_messages_text(&[joined(Some("+4915100000001"), Some("office"))]);
        assert_eq!(
            text,
            "Time: 2024-10-18 12:00:00 UTC\n\
             To:   +4915100000001 (office)\n\
             From: +31628870634\n\
             Your code is 1234\n\n"
        );
    }

    #[test]
    fn falls_back_to_imsi() {
        let text = render_messages_text(&[joined(None, None)]);
        assert!(text.contains("To:   262010000000001\n"));

        let text = render_messages_text(&[joined(Some("+4915100000001"), Some(""))]);
        assert!(text.contains("To:   +4915100000001\n"));
    }

    #[test]
    fn empty_list_renders_nothing() {
        assert_eq!(render_messages_text(&[]), "");
    }
}

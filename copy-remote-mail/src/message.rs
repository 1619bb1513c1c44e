use anyhow::{anyhow, Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use mail_parser::{MessageParser, MimeHeaders};

/// One attachment pulled out of a raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Part {
    pub name: String,
    pub data: Vec<u8>,
}

impl Part {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// What the backend needs from a fetched message.
#[derive(Debug, Default)]
pub(crate) struct Parsed {
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub attachments: Vec<Part>,
}

/// Build an RFC 5322 message carrying `parts` as attachments, in order.
pub(crate) fn compose(sender: &str, subject: &str, parts: Vec<Part>) -> Result<Vec<u8>> {
    let mailbox: Mailbox = sender
        .parse()
        .with_context(|| format!("invalid sender address {sender:?}"))?;
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| anyhow!("invalid content type: {e:?}"))?;

    let mut body = MultiPart::mixed().singlepart(
        SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(String::new()),
    );
    for part in parts {
        body = body.singlepart(Attachment::new(part.name).body(part.data, content_type.clone()));
    }
    let message = Message::builder()
        .from(mailbox.clone())
        .to(mailbox)
        .subject(subject)
        .multipart(body)
        .context("build message")?;
    Ok(message.formatted())
}

/// Sender, subject and named attachments of a raw message. Attachments
/// without a file name are not addressable and are left out.
pub(crate) fn parse(raw: &[u8]) -> Option<Parsed> {
    let message = MessageParser::default().parse(raw)?;
    let sender = message
        .from()
        .and_then(|from| from.first())
        .and_then(|addr| addr.address())
        .map(str::to_string);
    let attachments = message
        .attachments()
        .filter_map(|part| {
            part.attachment_name().map(|name| Part {
                name: name.to_string(),
                data: part.contents().to_vec(),
            })
        })
        .collect();
    Some(Parsed {
        sender,
        subject: message.subject().map(str::to_string),
        attachments,
    })
}

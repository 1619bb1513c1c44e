use crate::message::Part;
use crate::Fetched;
use chrono::{DateTime, Utc};

/// What is left of a message once one attachment is taken out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Survivor {
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub received: Option<DateTime<Utc>>,
    pub parts: Vec<Part>,
}

impl Survivor {
    /// INTERNALDATE argument of `APPEND`, e.g. `05-Nov-2024 12:34:56 +0000`.
    pub fn internal_date(&self) -> Option<String> {
        self.received
            .map(|received| received.format("%d-%b-%Y %H:%M:%S %z").to_string())
    }
}

/// Messages an attachment removal flags, and the rewritten messages to
/// append first so that sibling attachments stay readable.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Removal {
    pub flagged: Vec<u32>,
    pub survivors: Vec<Survivor>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }
}

/// Plan taking attachment `name` out of `messages`. Every message carrying
/// it is flagged. Each of those that carries other named attachments yields
/// a survivor with the same sender, subject and receive date.
pub(crate) fn plan_removal(messages: &[Fetched], name: &str) -> Removal {
    let mut removal = Removal::default();
    for message in messages {
        if message.attachment(name).is_none() {
            continue;
        }
        removal.flagged.push(message.uid);
        let parts: Vec<Part> = message
            .parsed
            .attachments
            .iter()
            .filter(|part| part.name != name)
            .cloned()
            .collect();
        if !parts.is_empty() {
            removal.survivors.push(Survivor {
                sender: message.parsed.sender.clone(),
                subject: message.parsed.subject.clone(),
                received: message.received,
                parts,
            });
        }
    }
    removal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Parsed;
    use chrono::TimeZone;

    fn fetched(uid: u32, names: &[&str]) -> Fetched {
        Fetched {
            uid,
            received: Some(Utc.with_ymd_and_hms(2024, 11, 5, 12, 34, 56).unwrap()),
            parsed: Parsed {
                sender: Some("scanner@corp.example".into()),
                subject: Some("Scans for Monday".into()),
                attachments: names
                    .iter()
                    .map(|name| Part::new(*name, name.as_bytes().to_vec()))
                    .collect(),
            },
        }
    }

    #[test]
    fn sibling_attachment_survives_removal() {
        let messages = [fetched(7, &["a.pdf", "b.pdf"])];
        let removal = plan_removal(&messages, "a.pdf");

        assert_eq!(removal.flagged, [7]);
        assert_eq!(removal.survivors.len(), 1);
        let survivor = &removal.survivors[0];
        assert_eq!(survivor.parts, [Part::new("b.pdf", b"b.pdf".to_vec())]);
        assert_eq!(survivor.subject.as_deref(), Some("Scans for Monday"));
        assert_eq!(survivor.sender.as_deref(), Some("scanner@corp.example"));
        assert_eq!(
            survivor.internal_date().as_deref(),
            Some("05-Nov-2024 12:34:56 +0000")
        );
    }

    #[test]
    fn lone_attachment_leaves_no_survivor() {
        let messages = [fetched(3, &["a.pdf"]), fetched(4, &["b.pdf"])];
        let removal = plan_removal(&messages, "a.pdf");
        assert_eq!(removal.flagged, [3]);
        assert!(removal.survivors.is_empty());
    }

    #[test]
    fn every_carrier_is_flagged() {
        let messages = [
            fetched(1, &["a.pdf", "c.pdf"]),
            fetched(2, &["b.pdf"]),
            fetched(5, &["a.pdf"]),
        ];
        let removal = plan_removal(&messages, "a.pdf");
        assert_eq!(removal.flagged, [1, 5]);
        assert_eq!(removal.survivors.len(), 1);
        assert_eq!(removal.survivors[0].parts[0].name, "c.pdf");
    }

    #[test]
    fn absent_attachment_plans_nothing() {
        let messages = [fetched(1, &["b.pdf"])];
        let removal = plan_removal(&messages, "a.pdf");
        assert!(removal.is_empty());
        assert_eq!(removal, Removal::default());
    }
}

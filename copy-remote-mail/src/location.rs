use std::fmt;

const SEPARATOR: &str = "::";
const DEFAULT_FOLDER: &str = "INBOX";

/// Container address on a mailbox: `[folder::]subject-key`.
///
/// The key selects messages whose subject contains it; the folder defaults
/// to `INBOX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailLocation {
    pub folder: String,
    pub key: String,
}

impl MailLocation {
    pub fn parse(location: &str) -> Self {
        match location.split_once(SEPARATOR) {
            Some((folder, key)) if !folder.trim().is_empty() => Self {
                folder: folder.trim().to_string(),
                key: key.trim().to_string(),
            },
            Some((_, key)) => Self {
                folder: DEFAULT_FOLDER.to_string(),
                key: key.trim().to_string(),
            },
            None => Self {
                folder: DEFAULT_FOLDER.to_string(),
                key: location.trim().to_string(),
            },
        }
    }

    /// `SEARCH` criteria for live messages carrying the key in their subject.
    pub fn search_query(&self) -> String {
        format!("UNSEEN UNDELETED SUBJECT {}", quote(&self.key))
    }
}

impl fmt::Display for MailLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.folder, SEPARATOR, self.key)
    }
}

/// IMAP quoted string.
pub(crate) fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\r' | '\n' => {}
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

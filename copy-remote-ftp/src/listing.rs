use chrono::{DateTime, Utc};
use copy_core::ElementMeta;
use std::str::FromStr;
use suppaftp::list::File;
use tracing::debug;

/// Turn one `LIST` line into element metadata. Directories, links to
/// directories and unparsable lines yield `None`.
pub(crate) fn parse_entry(line: &str, with_owner: bool) -> Option<ElementMeta> {
    let file = match File::from_str(line) {
        Ok(file) => file,
        Err(err) => {
            debug!("skipping unparsable listing line {:?}: {}", line, err);
            return None;
        }
    };
    if !file.is_file() || file.name() == "." || file.name() == ".." {
        return None;
    }
    let mut meta = ElementMeta::new(file.name(), file.size() as u64)
        .with_created(DateTime::<Utc>::from(file.modified()));
    if with_owner {
        if let Some(owner) = raw_owner(line) {
            meta = meta.with_owner(owner);
        }
    }
    Some(meta)
}

/// Owner column of a unix-style `LIST` line, e.g. `alice` in
/// `-rw-r--r-- 1 alice staff 1024 Nov 5 12:34 report.txt`.
/// DOS-style listings have no owner column.
pub(crate) fn raw_owner(line: &str) -> Option<String> {
    let mut fields = line.split_whitespace();
    let mode = fields.next()?;
    let unix_mode = mode.is_ascii()
        && mode.len() >= 10
        && mode.starts_with(['-', 'd', 'l', 'b', 'c', 'p', 's'])
        && mode[1..10].chars().all(|c| "rwxsStT-".contains(c));
    if !unix_mode {
        return None;
    }
    let _links = fields.next()?;
    fields.next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIX_FILE: &str = "-rw-r--r--    1 alice    staff        1024 Nov  5 12:34 report.txt";
    const UNIX_DIR: &str = "drwxr-xr-x    2 bob      staff        4096 Nov  5 12:34 archive";
    const DOS_FILE: &str = "10-19-20  03:19PM                 4096 setup.exe";
    const DOS_DIR: &str = "10-19-20  03:19PM       <DIR>          docs";

    #[test]
    fn owner_comes_from_the_third_unix_column() {
        assert_eq!(raw_owner(UNIX_FILE).as_deref(), Some("alice"));
        assert_eq!(raw_owner(UNIX_DIR).as_deref(), Some("bob"));
        assert_eq!(raw_owner(DOS_FILE), None);
        assert_eq!(raw_owner(""), None);
        assert_eq!(raw_owner("-rw-r--r--"), None);
    }

    #[test]
    fn files_are_parsed_and_directories_skipped() {
        let meta = parse_entry(UNIX_FILE, true).unwrap();
        assert_eq!(meta.name, "report.txt");
        assert_eq!(meta.size, 1024);
        assert_eq!(meta.owner.as_deref(), Some("alice"));
        assert!(meta.created.is_some());

        let meta = parse_entry(UNIX_FILE, false).unwrap();
        assert_eq!(meta.owner, None);

        assert!(parse_entry(UNIX_DIR, true).is_none());
        assert!(parse_entry(DOS_DIR, true).is_none());
        assert!(parse_entry("total 42", true).is_none());
    }

    #[test]
    fn dos_listing_has_no_owner() {
        let meta = parse_entry(DOS_FILE, true).unwrap();
        assert_eq!(meta.name, "setup.exe");
        assert_eq!(meta.size, 4096);
        assert_eq!(meta.owner, None);
    }
}

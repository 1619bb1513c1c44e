use crate::config::FilterConfig;
use crate::element::ElementMeta;
use crate::error::CopyError;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::warn;

/// Runtime filter compiled from a [`FilterConfig`]. Every predicate must
/// hold for an element to be selected.
#[derive(Debug, Clone)]
pub struct ElementFilter {
    name: Regex,
    author: Regex,
    author_restrictive: bool,
    created_after: Option<DateTime<Utc>>,
    max_size: Option<u64>,
    min_size: u64,
}

impl ElementFilter {
    pub fn compile(cfg: &FilterConfig) -> Result<Self, CopyError> {
        Ok(Self {
            name: compile_pattern("name", &cfg.name)?,
            author: compile_pattern("author", &cfg.author)?,
            author_restrictive: !is_match_all(&cfg.author),
            created_after: cfg.created_after,
            max_size: cfg.max_size,
            min_size: cfg.min_size,
        })
    }

    /// Whether evaluating this filter requires the element owner. Backends
    /// with an expensive owner lookup skip it otherwise.
    pub fn needs_owner(&self) -> bool {
        self.author_restrictive
    }

    pub fn needs_created(&self) -> bool {
        self.created_after.is_some()
    }

    /// Evaluate all predicates. Metadata the backend did not supply passes.
    pub fn matches(&self, meta: &ElementMeta) -> bool {
        self.name.is_match(&meta.name)
            && meta
                .owner
                .as_deref()
                .map_or(true, |owner| self.author.is_match(owner))
            && match (self.created_after, meta.created) {
                (Some(floor), Some(created)) => created >= floor,
                _ => true,
            }
            && meta.size > self.min_size
            && self.max_size.map_or(true, |max| meta.size < max)
    }

    /// Start evaluating elements for one listing call on `backend`.
    pub fn begin_listing<'a>(&'a self, backend: &'a str) -> ListingFilter<'a> {
        ListingFilter {
            filter: self,
            backend,
            warned_owner: false,
            warned_created: false,
        }
    }
}

/// An [`ElementFilter`] scoped to a single listing call, so that a predicate
/// the backend cannot evaluate is reported once rather than per element.
pub struct ListingFilter<'a> {
    filter: &'a ElementFilter,
    backend: &'a str,
    warned_owner: bool,
    warned_created: bool,
}

impl ListingFilter<'_> {
    pub fn check(&mut self, meta: &ElementMeta) -> bool {
        if meta.owner.is_none() && self.filter.needs_owner() && !self.warned_owner {
            warn!(
                "author filter is not supported by {}, skipping it",
                self.backend
            );
            self.warned_owner = true;
        }
        if meta.created.is_none() && self.filter.needs_created() && !self.warned_created {
            warn!(
                "creation time filter is not supported by {}, skipping it",
                self.backend
            );
            self.warned_created = true;
        }
        self.filter.matches(meta)
    }
}

fn is_match_all(pattern: &str) -> bool {
    pattern.is_empty() || pattern == FilterConfig::MATCH_ALL
}

fn compile_pattern(field: &'static str, pattern: &str) -> Result<Regex, CopyError> {
    Regex::new(pattern).map_err(|source| CopyError::InvalidPattern {
        field,
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use tracing_test::traced_test;

    fn filter(cfg: FilterConfig) -> ElementFilter {
        ElementFilter::compile(&cfg).unwrap()
    }

    #[test]
    fn default_filter_selects_everything_non_empty() {
        let f = filter(FilterConfig::default());
        assert!(f.matches(&ElementMeta::new("anything.bin", 1)));
        assert!(!f.matches(&ElementMeta::new("empty.bin", 0)));
        assert!(f.matches(&ElementMeta::new("x", u64::MAX).with_owner("root")));
        assert!(!f.needs_owner());
        assert!(!f.needs_created());
    }

    #[test]
    fn size_bounds_are_exclusive() {
        let f = filter(FilterConfig {
            min_size: 1000,
            max_size: Some(5000),
            ..FilterConfig::default()
        });
        assert!(!f.matches(&ElementMeta::new("a", 1000)));
        assert!(!f.matches(&ElementMeta::new("b", 5000)));
        assert!(f.matches(&ElementMeta::new("c", 2500)));
    }

    #[test]
    fn name_and_author_patterns() {
        let f = filter(FilterConfig {
            name: r"\.txt$".into(),
            author: "^alice$".into(),
            ..FilterConfig::default()
        });
        assert!(f.needs_owner());
        assert!(f.matches(&ElementMeta::new("notes.txt", 3).with_owner("alice")));
        assert!(!f.matches(&ElementMeta::new("notes.txt", 3).with_owner("bob")));
        assert!(!f.matches(&ElementMeta::new("notes.csv", 3).with_owner("alice")));
        // an owner the backend could not supply passes
        assert!(f.matches(&ElementMeta::new("notes.txt", 3)));
    }

    #[test]
    fn created_floor_is_inclusive() {
        let floor = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let f = filter(FilterConfig {
            created_after: Some(floor),
            ..FilterConfig::default()
        });
        assert!(f.matches(&ElementMeta::new("a", 1).with_created(floor)));
        assert!(!f.matches(&ElementMeta::new("a", 1).with_created(floor - Duration::seconds(1))));
    }

    #[traced_test]
    #[test]
    fn unsupported_predicate_warns_once_per_listing() {
        let f = filter(FilterConfig {
            author: "alice".into(),
            ..FilterConfig::default()
        });
        let mut listing = f.begin_listing("sftp client \"remote\"");
        for i in 0..5 {
            assert!(listing.check(&ElementMeta::new(format!("f{i}"), 10)));
        }
        logs_assert(|lines: &[&str]| {
            let warnings = lines
                .iter()
                .filter(|line| line.contains("author filter is not supported"))
                .count();
            match warnings {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {n}")),
            }
        });
    }

    fn arb_meta() -> impl Strategy<Value = ElementMeta> {
        (
            "[a-z]{1,6}\\.(txt|csv|log)",
            proptest::option::of(prop_oneof![Just("alice"), Just("bob")]),
            proptest::option::of(0i64..1_000_000),
            0u64..10_000,
        )
            .prop_map(|(name, owner, created, size)| ElementMeta {
                name,
                owner: owner.map(str::to_string),
                created: created.map(|s| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap()),
                size,
            })
    }

    proptest! {
        #[test]
        fn selected_iff_every_predicate_holds(
            meta in arb_meta(),
            ext in prop_oneof![Just("txt"), Just("csv")],
            author in prop_oneof![Just(".*"), Just("^alice$")],
            floor in proptest::option::of(0i64..1_000_000),
            min_size in 0u64..10_000,
            max_size in proptest::option::of(0u64..10_000),
        ) {
            let created_after = floor.map(|s| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap());
            let f = filter(FilterConfig {
                name: format!(r"\.{ext}$"),
                author: author.to_string(),
                created_after,
                max_size,
                min_size,
            });

            let name_ok = meta.name.ends_with(&format!(".{ext}"));
            let author_ok = author == ".*" || meta.owner.as_deref().map_or(true, |o| o == "alice");
            let created_ok = match (created_after, meta.created) {
                (Some(floor), Some(created)) => created >= floor,
                _ => true,
            };
            let size_ok = meta.size > min_size && max_size.map_or(true, |m| meta.size < m);

            prop_assert_eq!(f.matches(&meta), name_ok && author_ok && created_ok && size_ok);
        }
    }
}

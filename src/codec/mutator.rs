//! Path Mutator
//!
//! Turns a dotted Graphite path into a canonical `{name, fields}` pair using
//! the first matching rule. Paths no rule matches keep their full path as the
//! name, with dots replaced by underscores.

use crate::codec::error::DecodeError;
use crate::codec::rules::{MutatorRules, Token};
use crate::metric::NAME_SEPARATOR;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Separator used when a catch-all token folds several segments into one
pub const CATCH_ALL_JOIN: &str = "_";

/// Result of decomposing a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

/// Rule-driven path decomposer. Cheap to clone; the rule table is shared.
#[derive(Debug, Clone)]
pub struct PathMutator {
    rules: Arc<MutatorRules>,
}

impl PathMutator {
    pub fn new(rules: Arc<MutatorRules>) -> Self {
        PathMutator { rules }
    }

    pub fn rules(&self) -> &MutatorRules {
        &self.rules
    }

    /// Decompose a dotted path into name and fields
    pub fn mutate(&self, path: &str) -> Result<Mutation, DecodeError> {
        let (components, fields) = match self.rules.first_match(path) {
            Some(rule) => apply_tokens(rule.tokens(), path),
            None => (vec![path.replace('.', CATCH_ALL_JOIN)], BTreeMap::new()),
        };

        let name = components.join(NAME_SEPARATOR);
        if components.is_empty() || name.is_empty() {
            return Err(DecodeError::name_resolution_failed(path));
        }
        Ok(Mutation { name, fields })
    }
}

/// Walk tokens and segments in lockstep. Stops at the first catch-all or when
/// either side runs out.
fn apply_tokens(tokens: &[Token], path: &str) -> (Vec<String>, BTreeMap<String, String>) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut name = Vec::new();
    let mut fields = BTreeMap::new();

    for (i, (token, segment)) in tokens.iter().zip(segments.iter()).enumerate() {
        match token {
            Token::CatchAllName => {
                name.push(segments[i..].join(CATCH_ALL_JOIN));
                break;
            }
            Token::Skip => {}
            Token::Name => name.push((*segment).to_string()),
            Token::CatchAllField(key) => {
                fields.insert(key.clone(), segments[i..].join(CATCH_ALL_JOIN));
                break;
            }
            Token::Field(key) => {
                fields.insert(key.clone(), (*segment).to_string());
            }
        }
    }

    (name, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::error::DecodeErrorKind;

    fn mutator(rules: &str) -> PathMutator {
        PathMutator::new(Arc::new(MutatorRules::parse(rules).unwrap()))
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fallback_replaces_dots() {
        let m = mutator("");
        let out = m.mutate("servers.web01.cpu.user").unwrap();
        assert_eq!(out.name, "servers_web01_cpu_user");
        assert!(out.fields.is_empty());
    }

    #[test]
    fn test_host_service_catch_all() {
        let m = mutator("^app\\.[a-z0-9]+\\.[a-z]+\\.cpu$|||_.host.service.+");
        let out = m.mutate("app.web01.billing.cpu").unwrap();
        assert_eq!(out.name, "cpu");
        assert_eq!(out.fields, fields(&[("host", "web01"), ("service", "billing")]));
    }

    #[test]
    fn test_catch_all_folds_remaining_segments() {
        let m = mutator("^a\\..*$|||x.y.+");
        let out = m.mutate("a.b.c.d").unwrap();
        assert_eq!(out.name, "c_d");
        assert_eq!(out.fields, fields(&[("x", "a"), ("y", "b")]));
    }

    #[test]
    fn test_numeric_tokens_collect_name_components_in_order() {
        let m = mutator("^.*$|||1.host.2.3");
        let out = m.mutate("cpu.web01.load.avg").unwrap();
        assert_eq!(out.name, "cpu:load:avg");
        assert_eq!(out.fields, fields(&[("host", "web01")]));
    }

    #[test]
    fn test_numeric_catch_all_after_name_component() {
        let m = mutator("^.*$|||1._.2+");
        let out = m.mutate("disk.sda.read.bytes.total").unwrap();
        assert_eq!(out.name, "disk:read_bytes_total");
        assert!(out.fields.is_empty());
    }

    #[test]
    fn test_field_catch_all_stops_evaluation() {
        let m = mutator("^.*$|||1.host.device+");
        let out = m.mutate("disk.web01.dev.sda1.part").unwrap();
        assert_eq!(out.name, "disk");
        assert_eq!(
            out.fields,
            fields(&[("host", "web01"), ("device", "dev_sda1_part")])
        );
    }

    #[test]
    fn test_only_fields_is_name_resolution_failure() {
        let m = mutator("^.*$|||host.service");
        let err = m.mutate("web01.billing").unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::NameResolutionFailed);
        assert_eq!(err.raw(), "web01.billing");
    }

    #[test]
    fn test_short_template_ignores_extra_segments() {
        let m = mutator("^.*$|||1.host");
        let out = m.mutate("cpu.web01.extra.segments").unwrap();
        assert_eq!(out.name, "cpu");
        assert_eq!(out.fields, fields(&[("host", "web01")]));
    }

    #[test]
    fn test_long_template_ignores_extra_tokens() {
        let m = mutator("^.*$|||1.host.region.+");
        let out = m.mutate("cpu.web01").unwrap();
        assert_eq!(out.name, "cpu");
        assert_eq!(out.fields, fields(&[("host", "web01")]));
    }

    #[test]
    fn test_first_match_wins() {
        let m = mutator(
            "^app\\..*$|||_.host.+\n\
             ^app\\.web01\\..*$|||_._.service.+",
        );
        let out = m.mutate("app.web01.billing.cpu").unwrap();
        assert_eq!(out.name, "billing_cpu");
        assert_eq!(out.fields, fields(&[("host", "web01")]));
    }

    #[test]
    fn test_empty_path_fails() {
        let m = mutator("");
        assert!(m.mutate("").is_err());
    }
}

use std::collections::HashMap;
use log::warn;
use regex::Regex;
use crate::error::{Result, ShipError};
use crate::labels::{is_valid_label_name, LabelSet};

/// How a single load balancer tag turns into labels.
#[derive(Debug, Clone)]
pub enum TagLabelRule {
    /// copy the tag value under this label name
    Label(String),
    /// named capture groups become labels
    Pattern(Regex),
}

/// Compiled form of the `elb_tags_as_labels` table, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct TagLabelMap {
    rules: HashMap<String, TagLabelRule>,
}

impl TagLabelMap {

    /// A value wrapped in slashes (`/regex/`) is a pattern, anything else is
    /// a literal label name.
    pub fn compile(table: &HashMap<String, String>) -> Result<Self> {

        let mut rules = HashMap::with_capacity(table.len());

        for (tag, target) in table {
            let rule = if target.len() >= 2 && target.starts_with('/') && target.ends_with('/') {
                let regex = Regex::new(&target[1..target.len() - 1])
                                .map_err(|e| ShipError::InvalidTagPattern {
                                    tag: tag.clone(),
                                    pattern: target.clone(),
                                    source: e,
                                })?;

                // group 0 is the whole match and never has a name
                for name in regex.capture_names().skip(1) {
                    match name {
                        None => {
                            return Err(ShipError::UnnamedCaptureGroup { tag: tag.clone() });
                        },
                        Some(name) if !is_valid_label_name(name) => {
                            return Err(ShipError::InvalidLabelName {
                                tag: tag.clone(),
                                name: name.to_string(),
                            });
                        },
                        _ => {},
                    }
                }
                TagLabelRule::Pattern(regex)
            } else {
                if !is_valid_label_name(target) {
                    return Err(ShipError::InvalidLabelName {
                        tag: tag.clone(),
                        name: target.clone(),
                    });
                }
                TagLabelRule::Label(target.clone())
            };
            rules.insert(tag.clone(), rule);
        }

        Ok(Self { rules: rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Drops tags with no configured rule and turns the rest into labels.
    pub fn resolve(&self, tags: &HashMap<String, String>) -> LabelSet {

        let mut labels = LabelSet::new();

        for (tag, value) in tags {
            let Some(rule) = self.rules.get(tag) else {
                continue;
            };

            match rule {
                TagLabelRule::Label(name) => {
                    labels.insert(name.as_str(), value.as_str());
                },
                TagLabelRule::Pattern(regex) => {
                    Self::resolve_pattern(&mut labels, tag, regex, value);
                },
            }
        }
        labels
    }

    // a non matching group keeps whatever was resolved before it
    fn resolve_pattern(labels: &mut LabelSet, tag: &str, regex: &Regex, value: &str) {

        let caps = regex.captures(value);

        for (i, name) in regex.capture_names().enumerate().skip(1) {
            let name = name.unwrap_or_default();
            let Some(m) = caps.as_ref().and_then(|c| c.get(i)) else {
                warn!("No match found for label {} in tag {}", name, tag);
                break;
            };
            labels.insert(name, m.as_str());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn init() {
        let _ = env_logger::builder()
                        .filter(Some("lokilogs"), log::LevelFilter::Debug)
                        .is_test(true)
                        .try_init();
    }

    fn table(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_pattern_decomposes_tag() {
        init();

        let map = TagLabelMap::compile(&table(&[("Team", r"/^(?P<team>\w+)-(?P<env>\w+)$/")])).unwrap();
        let labels = map.resolve(&table(&[("Team", "payments-prod")]));

        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("team"), Some("payments"));
        assert_eq!(labels.get("env"), Some("prod"));
    }

    #[test]
    fn test_pattern_without_match_adds_nothing() {
        init();

        let map = TagLabelMap::compile(&table(&[("Team", r"/^(?P<team>\w+)-(?P<env>\w+)$/")])).unwrap();
        let labels = map.resolve(&table(&[("Team", "payments")]));

        assert!(labels.is_empty());
    }

    #[test]
    fn test_optional_group_stops_processing() {
        init();

        let map = TagLabelMap::compile(&table(&[("Team", r"/^(?P<team>\w+)(-(?P<env>\w+))?$/")]));
        // the second group is unnamed
        assert!(matches!(map, Err(ShipError::UnnamedCaptureGroup { .. })));

        let map = TagLabelMap::compile(&table(&[("Team", r"/^(?P<team>\w+)(?:-(?P<env>\w+))?$/")])).unwrap();
        let labels = map.resolve(&table(&[("Team", "payments")]));
        assert_eq!(labels.get("team"), Some("payments"));
        assert_eq!(labels.get("env"), None);
    }

    #[test]
    fn test_literal_copies_value() {
        let map = TagLabelMap::compile(&table(&[("Name", "lb_name")])).unwrap();
        let labels = map.resolve(&table(&[("Name", "my-lb"), ("Owner", "someone")]));

        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("lb_name"), Some("my-lb"));
    }

    #[test]
    fn test_unlisted_tags_are_dropped() {
        let map = TagLabelMap::compile(&table(&[("Name", "lb_name")])).unwrap();
        let labels = map.resolve(&table(&[("Owner", "someone")]));
        assert!(labels.is_empty());
    }

    #[test]
    fn test_configuration_errors() {
        match TagLabelMap::compile(&table(&[("Name", "lb-name")])) {
            Err(ShipError::InvalidLabelName { tag, name }) => {
                assert_eq!(tag, "Name");
                assert_eq!(name, "lb-name");
            },
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(TagLabelMap::compile(&table(&[("Team", "/(?P<team>\\w+/")])),
                        Err(ShipError::InvalidTagPattern { .. })));
        assert!(matches!(TagLabelMap::compile(&table(&[("Team", r"/(\w+)-(?P<env>\w+)/")])),
                        Err(ShipError::UnnamedCaptureGroup { .. })));
        assert!(matches!(TagLabelMap::compile(&table(&[("Name", "")])),
                        Err(ShipError::InvalidLabelName { .. })));
        // a lone slash is a literal, and not a valid label name
        assert!(matches!(TagLabelMap::compile(&table(&[("Name", "/")])),
                        Err(ShipError::InvalidLabelName { .. })));
    }
}

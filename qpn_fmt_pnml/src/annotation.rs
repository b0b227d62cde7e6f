//! Interpreter for the DICE `toolspecific` annotation grammars.
//!
//! Each annotation payload decodes to one [`AnnotationParam`] variant.
//! The grammar identifier of the payload's first value selects the
//! variant; further values carry its fields. Identifiers outside the
//! published vocabulary decode to [`AnnotationParam::Ignored`].

use crate::parser::ToolSpecific;
use log::trace;
use thiserror::Error;

// Grammar identifiers of the published vocabulary. The host spelling is
// inconsistent across entries (`dsico` vs `disco`); both appear verbatim
// in documents produced by the modeling frontend.
pub(crate) const GRAMMAR_TSERV_INFINITE: &str = "http://es.unizar.dsico/pnconstants/tserv/infinite";
pub(crate) const GRAMMAR_TKIND_EXPONENTIAL: &str =
    "http://es.unizar.disco/pnconstants/tkind/exponential";
pub(crate) const GRAMMAR_TKIND_IMMEDIATE_PRIORITY: &str =
    "http://es.unizar.disco/pnconstants/tkind/immediatepriority";
pub(crate) const GRAMMAR_TKIND_IMMEDIATE: &str =
    "http://es.unizar.disco/pnconstants/tkind/immediate";
pub(crate) const GRAMMAR_AKIND_INHIBITOR: &str =
    "http://es.unizar.dsico/pnconstants/akind/inhibitor";
pub(crate) const GRAMMAR_COLOR_COLORSET: &str = "http://es.unizar.dsico/pnconstants/color/colorset";
pub(crate) const GRAMMAR_COLOR_COLOR: &str = "http://es.unizar.dsico/pnconstants/color/color";

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("annotation payload has no value element")]
    EmptyPayload,
    #[error("grammar `{0}` requires {1} value element(s)")]
    MissingValue(&'static str, usize),
    #[error("failed to parse `{text}` as {expected} for grammar `{grammar}`")]
    Malformed {
        grammar: &'static str,
        expected: &'static str,
        text: String,
    },
}

/// A decoded annotation parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationParam {
    /// The annotated transition has unbounded server capacity.
    InfiniteServers,
    /// Timed firing with exponentially distributed delay of the given rate.
    ExponentialFiring(f64),
    /// Immediate firing with the given priority.
    FiringPriority(i32),
    /// Immediate firing with the given weight.
    FiringWeight(f64),
    /// The annotated arc inhibits instead of enabling.
    InhibitorArc,
    /// Opens a colorset declaration group.
    ColorSet { name: String, ordered: bool },
    /// A color belonging to the most recently opened colorset.
    Color { id: u32, name: String, tokens: u32 },
    /// Grammar outside the vocabulary; carries no information.
    Ignored,
}

fn required<'a>(
    specific: &'a ToolSpecific,
    grammar: &'static str,
    index: usize,
    count: usize,
) -> Result<&'a str, AnnotationError> {
    specific
        .values
        .get(index)
        .map(|v| v.text.as_str())
        .ok_or(AnnotationError::MissingValue(grammar, count))
}

fn parse_num<T: std::str::FromStr>(
    text: &str,
    grammar: &'static str,
    expected: &'static str,
) -> Result<T, AnnotationError> {
    text.trim().parse().map_err(|_| AnnotationError::Malformed {
        grammar,
        expected,
        text: text.to_string(),
    })
}

impl AnnotationParam {
    /// Decodes one annotation payload.
    ///
    /// Fails when the payload is empty or a recognized grammar's values
    /// are missing or malformed.
    pub fn decode(specific: &ToolSpecific) -> Result<Self, AnnotationError> {
        let first = specific.values.first().ok_or(AnnotationError::EmptyPayload)?;
        let param = match first.grammar.as_deref() {
            Some(GRAMMAR_TSERV_INFINITE) => AnnotationParam::InfiniteServers,
            Some(GRAMMAR_TKIND_EXPONENTIAL) => {
                let rate = parse_num(&first.text, GRAMMAR_TKIND_EXPONENTIAL, "f64")?;
                AnnotationParam::ExponentialFiring(rate)
            }
            Some(GRAMMAR_TKIND_IMMEDIATE_PRIORITY) => {
                let priority = parse_num(&first.text, GRAMMAR_TKIND_IMMEDIATE_PRIORITY, "i32")?;
                AnnotationParam::FiringPriority(priority)
            }
            Some(GRAMMAR_TKIND_IMMEDIATE) => {
                let weight = parse_num(&first.text, GRAMMAR_TKIND_IMMEDIATE, "f64")?;
                AnnotationParam::FiringWeight(weight)
            }
            Some(GRAMMAR_AKIND_INHIBITOR) => AnnotationParam::InhibitorArc,
            Some(GRAMMAR_COLOR_COLORSET) => {
                let name = first.text.trim().to_owned();
                let ordered = required(specific, GRAMMAR_COLOR_COLORSET, 1, 2)?.trim() == "1";
                AnnotationParam::ColorSet { name, ordered }
            }
            Some(GRAMMAR_COLOR_COLOR) => {
                let id = parse_num(&first.text, GRAMMAR_COLOR_COLOR, "u32")?;
                let name = required(specific, GRAMMAR_COLOR_COLOR, 1, 3)?
                    .trim()
                    .to_owned();
                let tokens = parse_num(
                    required(specific, GRAMMAR_COLOR_COLOR, 2, 3)?,
                    GRAMMAR_COLOR_COLOR,
                    "u32",
                )?;
                AnnotationParam::Color { id, name, tokens }
            }
            other => {
                trace!(target: "parser", "ignoring annotation grammar {other:?}");
                AnnotationParam::Ignored
            }
        };
        Ok(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::AnnotationValue;

    fn payload(values: &[(Option<&str>, &str)]) -> ToolSpecific {
        ToolSpecific {
            values: values
                .iter()
                .map(|(grammar, text)| AnnotationValue {
                    grammar: grammar.map(str::to_owned),
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn infinite_servers() {
        let specific = payload(&[(Some(GRAMMAR_TSERV_INFINITE), "")]);
        assert_eq!(
            AnnotationParam::decode(&specific).unwrap(),
            AnnotationParam::InfiniteServers
        );
    }

    #[test]
    fn exponential_rate() {
        let specific = payload(&[(Some(GRAMMAR_TKIND_EXPONENTIAL), "0.25")]);
        assert_eq!(
            AnnotationParam::decode(&specific).unwrap(),
            AnnotationParam::ExponentialFiring(0.25)
        );
    }

    #[test]
    fn negative_priority_is_kept() {
        let specific = payload(&[(Some(GRAMMAR_TKIND_IMMEDIATE_PRIORITY), "-1")]);
        assert_eq!(
            AnnotationParam::decode(&specific).unwrap(),
            AnnotationParam::FiringPriority(-1)
        );
    }

    #[test]
    fn colorset_needs_two_values() {
        let specific = payload(&[(Some(GRAMMAR_COLOR_COLORSET), "mapping")]);
        assert!(AnnotationParam::decode(&specific).is_err());
        let specific = payload(&[(Some(GRAMMAR_COLOR_COLORSET), "mapping"), (None, "1")]);
        assert_eq!(
            AnnotationParam::decode(&specific).unwrap(),
            AnnotationParam::ColorSet {
                name: "mapping".to_string(),
                ordered: true,
            }
        );
    }

    #[test]
    fn color_fields() {
        let specific = payload(&[
            (Some(GRAMMAR_COLOR_COLOR), "2"),
            (None, "job"),
            (None, "5"),
        ]);
        assert_eq!(
            AnnotationParam::decode(&specific).unwrap(),
            AnnotationParam::Color {
                id: 2,
                name: "job".to_string(),
                tokens: 5,
            }
        );
    }

    #[test]
    fn unknown_grammar_is_ignored() {
        let specific = payload(&[(Some("http://example.com/other"), "x")]);
        assert_eq!(
            AnnotationParam::decode(&specific).unwrap(),
            AnnotationParam::Ignored
        );
        let specific = payload(&[(None, "x")]);
        assert_eq!(
            AnnotationParam::decode(&specific).unwrap(),
            AnnotationParam::Ignored
        );
    }

    #[test]
    fn empty_payload_is_an_error() {
        let specific = ToolSpecific { values: Vec::new() };
        assert!(AnnotationParam::decode(&specific).is_err());
    }

    #[test]
    fn malformed_rate_is_an_error() {
        let specific = payload(&[(Some(GRAMMAR_TKIND_EXPONENTIAL), "fast")]);
        assert!(AnnotationParam::decode(&specific).is_err());
    }
}

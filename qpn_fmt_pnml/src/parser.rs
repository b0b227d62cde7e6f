//! Event-based reader for PNML documents.
//!
//! Produces a [`PnmlDocument`] holding the net's places, transitions and
//! arcs in document order, together with every attached `toolspecific`
//! annotation payload. Only the structure the translators need is
//! retained; graphics and other unknown elements are skipped.

mod vocabulary;

use anyhow::{anyhow, bail, Context};
use log::{info, trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufRead, Seek};
use std::path::Path;
use thiserror::Error;
use vocabulary::*;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("unknown or unexpected start tag `{0}`")]
    UnexpectedStartTag(String),
    #[error("unknown or unexpected end tag `{0}`")]
    UnexpectedEndTag(String),
    #[error("missing required attribute `{0}`")]
    MissingAttr(String),
    #[error("open tags have not been closed")]
    UnclosedTags,
}

/// One `value` fragment of a `toolspecific` annotation payload:
/// an optional grammar identifier plus its text content.
#[derive(Debug, Clone, Default)]
pub struct AnnotationValue {
    pub grammar: Option<String>,
    pub text: String,
}

/// One `toolspecific` annotation payload: an ordered list of values.
#[derive(Debug, Clone, Default)]
pub struct ToolSpecific {
    pub values: Vec<AnnotationValue>,
}

#[derive(Debug, Clone)]
pub struct PnmlPlace {
    pub id: String,
    pub name: Option<String>,
    pub marking: u32,
    pub specifics: Vec<ToolSpecific>,
}

#[derive(Debug, Clone)]
pub struct PnmlTransition {
    pub id: String,
    pub name: Option<String>,
    pub specifics: Vec<ToolSpecific>,
}

#[derive(Debug, Clone)]
pub struct PnmlArc {
    pub id: String,
    pub source: String,
    pub target: String,
    pub inscription: Option<u32>,
    pub specifics: Vec<ToolSpecific>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PnmlTag {
    Pnml,
    Net,
    Page,
    Place,
    Transition,
    Arc,
    Name,
    InitialMarking,
    Inscription,
    Toolspecific,
    Value,
    Text,
}

impl From<PnmlTag> for &'static str {
    fn from(value: PnmlTag) -> Self {
        match value {
            PnmlTag::Pnml => TAG_PNML,
            PnmlTag::Net => TAG_NET,
            PnmlTag::Page => TAG_PAGE,
            PnmlTag::Place => TAG_PLACE,
            PnmlTag::Transition => TAG_TRANSITION,
            PnmlTag::Arc => TAG_ARC,
            PnmlTag::Name => TAG_NAME,
            PnmlTag::InitialMarking => TAG_INITIAL_MARKING,
            PnmlTag::Inscription => TAG_INSCRIPTION,
            PnmlTag::Toolspecific => TAG_TOOLSPECIFIC,
            PnmlTag::Value => TAG_VALUE,
            PnmlTag::Text => TAG_TEXT,
        }
    }
}

fn attrs(
    tag: &BytesStart<'_>,
    keys: &[&str],
    opt_keys: &[&str],
) -> anyhow::Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in tag.attributes() {
        let attr = attr?;
        let key = String::from_utf8(attr.key.into_inner().to_vec())?;
        if keys.contains(&key.as_str()) || opt_keys.contains(&key.as_str()) {
            let val = attr.unescape_value()?.into_owned();
            attrs.insert(key, val);
        } else {
            // Foreign documents carry attributes we have no use for.
            trace!(target: "parser", "ignoring attribute '{key}'");
        }
    }
    for key in keys {
        if !attrs.contains_key(*key) {
            bail!(ParserError::MissingAttr(key.to_string()));
        }
    }
    Ok(attrs)
}

fn count_lines<R: BufRead + Seek>(mut reader: Reader<R>) -> usize {
    let end_pos = reader.buffer_position();
    reader.get_mut().rewind().unwrap();
    reader.into_inner().take(end_pos).lines().count()
}

/// Represents an imported PNML document, restricted to its first net.
#[derive(Debug, Default)]
pub struct PnmlDocument {
    /// Net-level annotation payloads, in document order.
    pub net_specifics: Vec<ToolSpecific>,
    pub places: Vec<PnmlPlace>,
    pub transitions: Vec<PnmlTransition>,
    pub arcs: Vec<PnmlArc>,
}

impl PnmlDocument {
    /// Imports the PNML document at the given path.
    ///
    /// Fails if the file cannot be read or contains syntactic errors.
    pub fn parse(path: &Path) -> anyhow::Result<Self> {
        info!(target: "parser", "parsing PNML file '{}'", path.display());
        let mut reader = Reader::from_file(path)
            .with_context(|| format!("failed to create reader from file '{}'", path.display()))?;
        let mut document = PnmlDocument::default();
        document.parse_document(&mut reader).with_context(|| {
            format!(
                "failed to parse PNML document at line {} in '{}'",
                count_lines(reader),
                path.display(),
            )
        })?;
        Ok(document)
    }

    /// Looks up a transition by its `name` label (not its id).
    pub fn transition_by_name(&self, name: &str) -> Option<&PnmlTransition> {
        self.transitions
            .iter()
            .find(|t| t.name.as_deref() == Some(name))
    }

    fn parse_document<R: BufRead>(&mut self, reader: &mut Reader<R>) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        let mut stack: Vec<PnmlTag> = Vec::new();
        let mut net_seen = false;
        let mut place: Option<PnmlPlace> = None;
        let mut transition: Option<PnmlTransition> = None;
        let mut arc: Option<PnmlArc> = None;
        let mut specific: Option<ToolSpecific> = None;
        let mut value: Option<AnnotationValue> = None;
        let mut text = String::new();
        loop {
            match reader
                .read_event_into(&mut buf)
                .context("failed reading event")?
            {
                Event::Start(tag) => {
                    let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                    trace!(target: "parser", "start tag '{tag_name}'");
                    match tag_name {
                        TAG_PNML if stack.is_empty() => {
                            stack.push(PnmlTag::Pnml);
                        }
                        TAG_NET if stack.last() == Some(&PnmlTag::Pnml) => {
                            if net_seen {
                                // Only the first net of the document is imported.
                                warn!(target: "parser", "skipping additional net");
                                reader
                                    .read_to_end_into(tag.to_end().into_owned().name(), &mut buf)?;
                            } else {
                                net_seen = true;
                                stack.push(PnmlTag::Net);
                            }
                        }
                        TAG_PAGE if stack.last() == Some(&PnmlTag::Net) => {
                            stack.push(PnmlTag::Page);
                        }
                        TAG_PLACE if stack.last() == Some(&PnmlTag::Page) => {
                            let attrs = attrs(&tag, &[ATTR_ID], &[])?;
                            place = Some(PnmlPlace {
                                id: attrs[ATTR_ID].clone(),
                                name: None,
                                marking: 0,
                                specifics: Vec::new(),
                            });
                            stack.push(PnmlTag::Place);
                        }
                        TAG_TRANSITION if stack.last() == Some(&PnmlTag::Page) => {
                            let attrs = attrs(&tag, &[ATTR_ID], &[])?;
                            transition = Some(PnmlTransition {
                                id: attrs[ATTR_ID].clone(),
                                name: None,
                                specifics: Vec::new(),
                            });
                            stack.push(PnmlTag::Transition);
                        }
                        TAG_ARC if stack.last() == Some(&PnmlTag::Page) => {
                            let attrs = attrs(&tag, &[ATTR_ID, ATTR_SOURCE, ATTR_TARGET], &[])?;
                            arc = Some(PnmlArc {
                                id: attrs[ATTR_ID].clone(),
                                source: attrs[ATTR_SOURCE].clone(),
                                target: attrs[ATTR_TARGET].clone(),
                                inscription: None,
                                specifics: Vec::new(),
                            });
                            stack.push(PnmlTag::Arc);
                        }
                        TAG_NAME
                            if matches!(
                                stack.last(),
                                Some(PnmlTag::Place) | Some(PnmlTag::Transition)
                            ) =>
                        {
                            stack.push(PnmlTag::Name);
                        }
                        TAG_INITIAL_MARKING if stack.last() == Some(&PnmlTag::Place) => {
                            stack.push(PnmlTag::InitialMarking);
                        }
                        TAG_INSCRIPTION if stack.last() == Some(&PnmlTag::Arc) => {
                            stack.push(PnmlTag::Inscription);
                        }
                        TAG_TOOLSPECIFIC
                            if matches!(
                                stack.last(),
                                Some(PnmlTag::Net)
                                    | Some(PnmlTag::Place)
                                    | Some(PnmlTag::Transition)
                                    | Some(PnmlTag::Arc)
                            ) =>
                        {
                            let _ = attrs(&tag, &[], &[ATTR_TOOL, ATTR_VERSION])?;
                            specific = Some(ToolSpecific::default());
                            stack.push(PnmlTag::Toolspecific);
                        }
                        TAG_VALUE if stack.last() == Some(&PnmlTag::Toolspecific) => {
                            let attrs = attrs(&tag, &[], &[ATTR_GRAMMAR])?;
                            value = Some(AnnotationValue {
                                grammar: attrs.get(ATTR_GRAMMAR).cloned(),
                                text: String::new(),
                            });
                            stack.push(PnmlTag::Value);
                        }
                        TAG_TEXT
                            if matches!(
                                stack.last(),
                                Some(PnmlTag::Name)
                                    | Some(PnmlTag::InitialMarking)
                                    | Some(PnmlTag::Inscription)
                            ) =>
                        {
                            text.clear();
                            stack.push(PnmlTag::Text);
                        }
                        // Unknown tag (graphics etc.): skip till matching end tag
                        _ => {
                            warn!(target: "parser", "unknown or unexpected tag '{tag_name}', skipping");
                            reader.read_to_end_into(tag.to_end().into_owned().name(), &mut buf)?;
                        }
                    }
                }
                Event::Empty(tag) => {
                    let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                    trace!(target: "parser", "empty tag '{tag_name}'");
                    match tag_name {
                        TAG_PLACE if stack.last() == Some(&PnmlTag::Page) => {
                            let attrs = attrs(&tag, &[ATTR_ID], &[])?;
                            self.places.push(PnmlPlace {
                                id: attrs[ATTR_ID].clone(),
                                name: None,
                                marking: 0,
                                specifics: Vec::new(),
                            });
                        }
                        TAG_TRANSITION if stack.last() == Some(&PnmlTag::Page) => {
                            let attrs = attrs(&tag, &[ATTR_ID], &[])?;
                            self.transitions.push(PnmlTransition {
                                id: attrs[ATTR_ID].clone(),
                                name: None,
                                specifics: Vec::new(),
                            });
                        }
                        TAG_ARC if stack.last() == Some(&PnmlTag::Page) => {
                            let attrs = attrs(&tag, &[ATTR_ID, ATTR_SOURCE, ATTR_TARGET], &[])?;
                            self.arcs.push(PnmlArc {
                                id: attrs[ATTR_ID].clone(),
                                source: attrs[ATTR_SOURCE].clone(),
                                target: attrs[ATTR_TARGET].clone(),
                                inscription: None,
                                specifics: Vec::new(),
                            });
                        }
                        TAG_VALUE if stack.last() == Some(&PnmlTag::Toolspecific) => {
                            let attrs = attrs(&tag, &[], &[ATTR_GRAMMAR])?;
                            specific
                                .as_mut()
                                .expect("open toolspecific")
                                .values
                                .push(AnnotationValue {
                                    grammar: attrs.get(ATTR_GRAMMAR).cloned(),
                                    text: String::new(),
                                });
                        }
                        _ => {
                            trace!(target: "parser", "ignoring empty tag '{tag_name}'");
                        }
                    }
                }
                Event::Text(t) => {
                    let content = &*reader.decoder().decode(t.as_ref())?;
                    match stack.last() {
                        Some(PnmlTag::Text) => text.push_str(content),
                        Some(PnmlTag::Value) => value
                            .as_mut()
                            .expect("open value")
                            .text
                            .push_str(content.trim()),
                        _ if content.trim().is_empty() => {}
                        _ => bail!("unexpected text content"),
                    }
                }
                Event::End(tag) => {
                    let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                    let top = stack.pop();
                    if top.is_none_or(|state| Into::<&str>::into(state) != tag_name) {
                        bail!(ParserError::UnexpectedEndTag(tag_name.to_string()));
                    }
                    trace!(target: "parser", "end tag '{tag_name}'");
                    match top.expect("tag matched") {
                        PnmlTag::Name => {
                            let name = text.trim().to_owned();
                            if let Some(place) = place.as_mut() {
                                place.name = Some(name);
                            } else if let Some(transition) = transition.as_mut() {
                                transition.name = Some(name);
                            }
                        }
                        PnmlTag::InitialMarking => {
                            let marking = text
                                .trim()
                                .parse()
                                .context("failed to parse initial marking")?;
                            place.as_mut().expect("open place").marking = marking;
                        }
                        PnmlTag::Inscription => {
                            let inscription = text
                                .trim()
                                .parse()
                                .context("failed to parse arc inscription")?;
                            arc.as_mut().expect("open arc").inscription = Some(inscription);
                        }
                        PnmlTag::Value => {
                            let v = value.take().expect("open value");
                            specific.as_mut().expect("open toolspecific").values.push(v);
                        }
                        PnmlTag::Toolspecific => {
                            let s = specific.take().expect("open toolspecific");
                            match stack.last() {
                                Some(PnmlTag::Place) => {
                                    place.as_mut().expect("open place").specifics.push(s)
                                }
                                Some(PnmlTag::Transition) => transition
                                    .as_mut()
                                    .expect("open transition")
                                    .specifics
                                    .push(s),
                                Some(PnmlTag::Arc) => {
                                    arc.as_mut().expect("open arc").specifics.push(s)
                                }
                                Some(PnmlTag::Net) => self.net_specifics.push(s),
                                _ => unreachable!("toolspecific has a known parent"),
                            }
                        }
                        PnmlTag::Place => {
                            self.places.push(place.take().expect("open place"));
                        }
                        PnmlTag::Transition => {
                            self.transitions
                                .push(transition.take().expect("open transition"));
                        }
                        PnmlTag::Arc => {
                            self.arcs.push(arc.take().expect("open arc"));
                        }
                        _ => {}
                    }
                }
                // Ignore comments and the XML declaration
                Event::Comment(_) | Event::Decl(_) => continue,
                Event::CData(_) => bail!("CData not supported"),
                Event::PI(_) => bail!("Processing Instructions not supported"),
                Event::DocType(_) => bail!("DocType not supported"),
                // exits the loop when reaching end of file
                Event::Eof => {
                    info!(target: "parser", "parsing completed");
                    break;
                }
            }
            // if we don't keep a borrow elsewhere, we can clear the buffer to keep memory usage low
            buf.clear();
        }
        if stack.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(ParserError::UnclosedTags))
        }
    }
}

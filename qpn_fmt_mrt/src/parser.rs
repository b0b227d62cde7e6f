//! Event-based reader for MapReduce-template documents.
//!
//! A document wraps an optional `sim` element holding a base model in
//! the archive schema, followed by any number of `template_mapreduce`
//! declarations. The base model is parsed through `qpn_core`'s archive
//! reader; template declarations are collected for the builder.

use anyhow::{anyhow, bail, Context};
use log::{info, trace, warn};
use qpn_core::{archive, QpnModel};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{BufRead, Seek};
use std::path::Path;
use thiserror::Error;

const TAG_SIM: &str = "sim";
const TAG_TEMPLATE: &str = "template_mapreduce";
const TAG_INPUT: &str = "input";
const TAG_FORK: &str = "fork";
const TAG_MAP: &str = "map";
const TAG_RED: &str = "red";
const TAG_MAPPER: &str = "mapper";
const TAG_REDUCER: &str = "reducer";
const TAG_SEMAPHORE: &str = "semaphore";
const TAG_CLASS: &str = "class";
const TAG_OUTPUT: &str = "output";

const ATTR_NAME: &str = "name";

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("unknown or unexpected end tag `{0}`")]
    UnexpectedEndTag(String),
    #[error("open tags have not been closed")]
    UnclosedTags,
    #[error("document holds no root element")]
    MissingRoot,
}

/// One `template_mapreduce` declaration.
#[derive(Debug, Clone, Default)]
pub struct MrtTemplate {
    pub name: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    /// Fan-out of the map-side fork.
    pub map_degree: u32,
    /// Fan-out of the reduce-side fork.
    pub red_degree: u32,
    pub mappers: u32,
    pub reducers: u32,
    /// Per-class semaphore thresholds, keyed by class name.
    pub thresholds: Vec<(String, u32)>,
}

/// An imported template document: the base model (empty when the
/// document carries no `sim` element) and the declared templates.
#[derive(Debug, Default)]
pub struct MrtDocument {
    pub model: QpnModel,
    pub templates: Vec<MrtTemplate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MrtTag {
    Document,
    Template,
    Input,
    Fork,
    Map,
    Red,
    Mapper,
    Reducer,
    Semaphore,
    Class,
    Output,
}

fn name_attr(tag: &BytesStart<'_>) -> anyhow::Result<Option<String>> {
    for attr in tag.attributes() {
        let attr = attr?;
        if attr.key.into_inner() == ATTR_NAME.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn count_lines<R: BufRead + Seek>(mut reader: Reader<R>) -> usize {
    let end_pos = reader.buffer_position();
    reader.get_mut().rewind().unwrap();
    reader.into_inner().take(end_pos).lines().count()
}

impl MrtDocument {
    /// Imports the template document at the given path.
    pub fn parse(path: &Path) -> anyhow::Result<Self> {
        info!(target: "parser", "parsing template document '{}'", path.display());
        let mut reader = Reader::from_file(path)
            .with_context(|| format!("failed to create reader from file '{}'", path.display()))?;
        let mut document = MrtDocument::default();
        document.parse_document(&mut reader).with_context(|| {
            format!(
                "failed to parse template document at line {} in '{}'",
                count_lines(reader),
                path.display(),
            )
        })?;
        Ok(document)
    }

    fn parse_document<R: BufRead>(&mut self, reader: &mut Reader<R>) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        let mut stack: Vec<MrtTag> = Vec::new();
        let mut root_name: Option<String> = None;
        let mut root_seen = false;
        let mut template: Option<MrtTemplate> = None;
        let mut class_name: Option<String> = None;
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
                        // Any root element name is accepted.
                        _ if stack.is_empty() && !root_seen => {
                            root_seen = true;
                            root_name = Some(tag_name.to_string());
                            stack.push(MrtTag::Document);
                        }
                        TAG_SIM if stack.last() == Some(&MrtTag::Document) => {
                            // The base model in the archive schema;
                            // read_sim consumes through the end tag.
                            archive::read_sim(reader, &mut self.model)
                                .context("failed to read embedded base model")?;
                        }
                        TAG_TEMPLATE if stack.last() == Some(&MrtTag::Document) => {
                            template = Some(MrtTemplate {
                                name: name_attr(&tag)?,
                                ..MrtTemplate::default()
                            });
                            stack.push(MrtTag::Template);
                        }
                        TAG_INPUT if stack.last() == Some(&MrtTag::Template) => {
                            template.as_mut().expect("open template").input = name_attr(&tag)?;
                            stack.push(MrtTag::Input);
                        }
                        TAG_OUTPUT if stack.last() == Some(&MrtTag::Template) => {
                            template.as_mut().expect("open template").output = name_attr(&tag)?;
                            stack.push(MrtTag::Output);
                        }
                        TAG_FORK if stack.last() == Some(&MrtTag::Template) => {
                            stack.push(MrtTag::Fork);
                        }
                        TAG_MAP if stack.last() == Some(&MrtTag::Fork) => {
                            text.clear();
                            stack.push(MrtTag::Map);
                        }
                        TAG_RED if stack.last() == Some(&MrtTag::Fork) => {
                            text.clear();
                            stack.push(MrtTag::Red);
                        }
                        TAG_MAPPER if stack.last() == Some(&MrtTag::Template) => {
                            text.clear();
                            stack.push(MrtTag::Mapper);
                        }
                        TAG_REDUCER if stack.last() == Some(&MrtTag::Template) => {
                            text.clear();
                            stack.push(MrtTag::Reducer);
                        }
                        TAG_SEMAPHORE if stack.last() == Some(&MrtTag::Template) => {
                            stack.push(MrtTag::Semaphore);
                        }
                        TAG_CLASS if stack.last() == Some(&MrtTag::Semaphore) => {
                            class_name = name_attr(&tag)?;
                            text.clear();
                            stack.push(MrtTag::Class);
                        }
                        _ => {
                            warn!(target: "parser", "unknown or unexpected tag '{tag_name}', skipping");
                            reader.read_to_end_into(tag.to_end().into_owned().name(), &mut buf)?;
                        }
                    }
                }
                Event::Empty(tag) => {
                    let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                    match tag_name {
                        TAG_INPUT if stack.last() == Some(&MrtTag::Template) => {
                            template.as_mut().expect("open template").input = name_attr(&tag)?;
                        }
                        TAG_OUTPUT if stack.last() == Some(&MrtTag::Template) => {
                            template.as_mut().expect("open template").output = name_attr(&tag)?;
                        }
                        TAG_SEMAPHORE if stack.last() == Some(&MrtTag::Template) => {}
                        _ => {
                            trace!(target: "parser", "ignoring empty tag '{tag_name}'");
                        }
                    }
                }
                Event::Text(t) => {
                    let content = &*reader.decoder().decode(t.as_ref())?;
                    match stack.last() {
                        Some(
                            MrtTag::Map
                            | MrtTag::Red
                            | MrtTag::Mapper
                            | MrtTag::Reducer
                            | MrtTag::Class,
                        ) => text.push_str(content),
                        _ if content.trim().is_empty() => {}
                        _ => bail!("unexpected text content"),
                    }
                }
                Event::End(tag) => {
                    let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                    let top = stack.pop();
                    let matches = match top {
                        Some(MrtTag::Document) => root_name.as_deref() == Some(tag_name),
                        Some(MrtTag::Template) => tag_name == TAG_TEMPLATE,
                        Some(MrtTag::Input) => tag_name == TAG_INPUT,
                        Some(MrtTag::Fork) => tag_name == TAG_FORK,
                        Some(MrtTag::Map) => tag_name == TAG_MAP,
                        Some(MrtTag::Red) => tag_name == TAG_RED,
                        Some(MrtTag::Mapper) => tag_name == TAG_MAPPER,
                        Some(MrtTag::Reducer) => tag_name == TAG_REDUCER,
                        Some(MrtTag::Semaphore) => tag_name == TAG_SEMAPHORE,
                        Some(MrtTag::Class) => tag_name == TAG_CLASS,
                        Some(MrtTag::Output) => tag_name == TAG_OUTPUT,
                        None => false,
                    };
                    if !matches {
                        bail!(ParserError::UnexpectedEndTag(tag_name.to_string()));
                    }
                    trace!(target: "parser", "end tag '{tag_name}'");
                    match top.expect("tag matched") {
                        MrtTag::Map => {
                            template.as_mut().expect("open template").map_degree =
                                text.trim().parse().context("failed to parse map fan-out")?;
                        }
                        MrtTag::Red => {
                            template.as_mut().expect("open template").red_degree =
                                text.trim().parse().context("failed to parse red fan-out")?;
                        }
                        MrtTag::Mapper => {
                            template.as_mut().expect("open template").mappers = text
                                .trim()
                                .parse()
                                .context("failed to parse mapper count")?;
                        }
                        MrtTag::Reducer => {
                            template.as_mut().expect("open template").reducers = text
                                .trim()
                                .parse()
                                .context("failed to parse reducer count")?;
                        }
                        MrtTag::Class => {
                            let tokens = text
                                .trim()
                                .parse()
                                .context("failed to parse semaphore threshold")?;
                            if let Some(name) = class_name.take() {
                                template
                                    .as_mut()
                                    .expect("open template")
                                    .thresholds
                                    .push((name, tokens));
                            }
                        }
                        MrtTag::Template => {
                            self.templates.push(template.take().expect("open template"));
                        }
                        _ => {}
                    }
                }
                Event::Comment(_) | Event::Decl(_) => continue,
                Event::CData(_) => bail!("CData not supported"),
                Event::PI(_) => bail!("Processing Instructions not supported"),
                Event::DocType(_) => bail!("DocType not supported"),
                Event::Eof => {
                    info!(target: "parser", "parsing completed");
                    break;
                }
            }
            buf.clear();
        }
        if !root_seen {
            bail!(ParserError::MissingRoot);
        }
        if stack.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(ParserError::UnclosedTags))
        }
    }
}

//! Reconstruction of colorset declarations from net-level annotations.
//!
//! Colored documents declare their colorsets as a flat stream of
//! net-level annotation payloads. The stream is decoded value by value
//! and folded back into groups: a `ColorSet` payload opens a new group,
//! each following `Color` payload joins the most recently opened one.

use crate::annotation::AnnotationParam;
use crate::parser::ToolSpecific;
use log::trace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColorsetError {
    #[error("color `{0}` declared before any colorset")]
    OrphanColor(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Color {
    pub id: u32,
    pub name: String,
    pub tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorSet {
    pub name: String,
    pub ordered: bool,
    pub colors: Vec<Color>,
}

/// Folds the net-level annotation stream into colorset declarations.
///
/// Declaration order is preserved, both across sets and within each
/// set. Payloads that are neither colorsets nor colors are skipped.
pub fn extract(specifics: &[ToolSpecific]) -> anyhow::Result<Vec<ColorSet>> {
    let mut sets: Vec<ColorSet> = Vec::new();
    for specific in specifics {
        match AnnotationParam::decode(specific)? {
            AnnotationParam::ColorSet { name, ordered } => {
                trace!(target: "parser", "colorset '{name}' opened");
                sets.push(ColorSet {
                    name,
                    ordered,
                    colors: Vec::new(),
                });
            }
            AnnotationParam::Color { id, name, tokens } => {
                let set = sets
                    .last_mut()
                    .ok_or_else(|| ColorsetError::OrphanColor(name.clone()))?;
                set.colors.push(Color { id, name, tokens });
            }
            _ => continue,
        }
    }
    Ok(sets)
}

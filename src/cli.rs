use anyhow::Context;
use clap::{Parser, Subcommand};
use qpn_core::archive;
use qpn_fmt_dag::{DagDocument, PipelineBuilder};
use qpn_fmt_mrt::{MrtDocument, TemplateBuilder};
use qpn_fmt_pnml::{HadoopCapBuilder, ModelBuilder, PnmlDocument};
use std::path::{Path, PathBuf};

/// Working-directory-relative location of the shipped station templates.
const TEMPLATES_PATH: &str = "templates";

/// Compiles Petri-net and template descriptions into simulation archives
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate an annotated PNML document as a generalized stochastic Petri net
    Gspn {
        /// Path of the PNML document
        source: PathBuf,
        /// Path of the archive to write
        target: PathBuf,
        /// Optional index file selecting the observed elements, one id per line
        index: Option<PathBuf>,
    },
    /// Expand a colored PNML document over the HadoopCap station template
    #[command(name = "swn-HadoopCap")]
    SwnHadoopCap {
        /// Path of the PNML document
        source: PathBuf,
        /// Path of the archive to write
        target: PathBuf,
    },
    /// Instantiate MapReduce templates declared in an XML document
    Mrt {
        /// Path of the template document
        source: PathBuf,
        /// Path of the archive to write
        target: PathBuf,
    },
    /// Compile a JSON DAG pipeline description
    Dag {
        /// Path of the JSON document
        source: PathBuf,
        /// Path of the archive to write
        target: PathBuf,
    },
}

fn read_index(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read index file '{}'", path.display()))?;
    Ok(content.lines().map(str::to_owned).collect())
}

impl Cli {
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.command {
            Command::Gspn {
                source,
                target,
                index,
            } => {
                let document = PnmlDocument::parse(source)?;
                let index = index.as_deref().map(read_index).transpose()?;
                let model = ModelBuilder::visit(&document, index.as_deref())?;
                archive::save_model(target, &model)
            }
            Command::SwnHadoopCap { source, target } => {
                let template_path = Path::new(TEMPLATES_PATH).join("HadoopCap.jsimg");
                let template = archive::load_model(&template_path).with_context(|| {
                    format!("failed to load template '{}'", template_path.display())
                })?;
                let document = PnmlDocument::parse(source)?;
                let model = HadoopCapBuilder::visit(template, &document)?;
                archive::save_model(target, &model)
            }
            Command::Mrt { source, target } => {
                let document = MrtDocument::parse(source)?;
                let model = TemplateBuilder::visit(document)?;
                archive::save_model(target, &model)
            }
            Command::Dag { source, target } => {
                let document = DagDocument::parse(source)?;
                let model = PipelineBuilder::visit(&document)?;
                archive::save_model(target, &model)
            }
        }
    }
}

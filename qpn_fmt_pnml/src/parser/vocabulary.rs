//! Tag and attribute names of the PNML interchange format.

pub(crate) const TAG_PNML: &str = "pnml";
pub(crate) const TAG_NET: &str = "net";
pub(crate) const TAG_PAGE: &str = "page";
pub(crate) const TAG_PLACE: &str = "place";
pub(crate) const TAG_TRANSITION: &str = "transition";
pub(crate) const TAG_ARC: &str = "arc";
pub(crate) const TAG_NAME: &str = "name";
pub(crate) const TAG_INITIAL_MARKING: &str = "initialMarking";
pub(crate) const TAG_INSCRIPTION: &str = "inscription";
pub(crate) const TAG_TOOLSPECIFIC: &str = "toolspecific";
pub(crate) const TAG_VALUE: &str = "value";
pub(crate) const TAG_TEXT: &str = "text";

pub(crate) const ATTR_ID: &str = "id";
pub(crate) const ATTR_SOURCE: &str = "source";
pub(crate) const ATTR_TARGET: &str = "target";
pub(crate) const ATTR_GRAMMAR: &str = "grammar";
pub(crate) const ATTR_TOOL: &str = "tool";
pub(crate) const ATTR_VERSION: &str = "version";

//! Rich-text documents with issue-link annotations.
//!
//! A [`Document`] is a tree of block elements holding marked text runs.
//! Issue links are link marks carrying an issue number, state and title;
//! they are read and rewritten through text offsets (see [`range`]) and
//! stored as HTML-subset markup (see [`markup`]).

pub mod link;
pub mod markup;
pub mod node;
pub mod preview;
pub mod range;

pub use link::{ISSUE_LINK_CLASS, LinkAttrs};
pub use node::{Document, Element, Mark, Node, TextRun};
pub use preview::{preview, preview_all};
pub use range::{LinkSpan, RunRef};

//! DOM Module - Arena-based text/element tree
//!
//! The bundled [`crate::adapter::TreeAdapter`] implementation:
//! - Arena allocation for nodes, `NodeId` handles for traversal
//! - Highlight containers recognised by a configurable class
//! - Markup loading (quick-xml) and serialisation (html-escape)

pub mod document;
pub mod markup;
pub mod node;

pub use document::{DEFAULT_HIGHLIGHT_CLASS, DEFAULT_HIGHLIGHT_TAG, Document};
pub use markup::MarkupError;
pub use node::{Element, Node, NodeData, NodeId};

//! Native shadow nodes paired with script wrappers.

pub mod comment;
pub mod document;
pub mod element;
pub mod node;
pub mod text;
mod tree;

pub use comment::CommentNode;
pub use document::Document;
pub use element::Element;
pub use node::{NativeNode, NodeData, NodeType, SetOutcome};
pub use text::TextNode;

use kuchiki::parse_html;
use kuchiki::traits::*;
use kuchiki::NodeRef;

use crate::binding::{DomState, ScriptError};
use crate::foundation::{NativeValue, TargetId};

/// Parse `markup` and append the resulting tree under the surface document.
///
/// Nodes are created natively (no script wrapper holds them), and every
/// creation and insertion command is queued in document order. Returns the
/// number of nodes created.
pub fn parse_into(state: &mut DomState, markup: &str) -> Result<usize, ScriptError> {
    let parsed = parse_html().one(markup);
    let document = state.document();
    let mut created = 0;
    for child in parsed.children() {
        created += mirror(state, &child, document)?;
    }
    tracing::debug!(target: "bridge", surface = %state.surface(), created, "markup parsed");
    Ok(created)
}

fn mirror(state: &mut DomState, node: &NodeRef, parent: TargetId) -> Result<usize, ScriptError> {
    let target = if let Some(element) = node.as_element() {
        let tag: &str = &element.name.local;
        let target = state.create_native("Element", &[NativeValue::from(tag)])?;
        let attributes = element.attributes.borrow();
        for (name, attribute) in attributes.map.iter() {
            let name: &str = &name.local;
            state.call_method(
                target,
                "setAttribute",
                &[NativeValue::from(name), NativeValue::from(attribute.value.as_str())],
            )?;
        }
        target
    } else if let Some(text) = node.as_text() {
        let data = NativeValue::from(text.borrow().as_str());
        state.create_native("TextNode", &[data])?
    } else if let Some(comment) = node.as_comment() {
        let data = NativeValue::from(comment.borrow().as_str());
        state.create_native("CommentNode", &[data])?
    } else {
        return Ok(0);
    };
    state.append_child(parent, target)?;

    let mut created = 1;
    for child in node.children() {
        created += mirror(state, &child, target)?;
    }
    Ok(created)
}

use crate::binding::{BindingScope, ScriptError, ScriptHeap};
use crate::css::CssStyleDeclaration;
use crate::foundation::{CommandType, NativeString, NativeValue};

use super::node::{string_arg, NativeNode, NodeData, NodeType, SetOutcome, READ_ONLY_BASE_NAMES};

pub const PROPERTY_NAMES: &[&str] = &["tagName", "style", "nodeName"];

pub const METHOD_NAMES: &[&str] = &[
    "setAttribute",
    "getAttribute",
    "removeAttribute",
    "hasAttribute",
];

/// Element with an inline style declaration and an attribute list. Any
/// property script sets beyond the declared ones is mirrored to the host as
/// `setProperty`.
pub struct Element {
    node: NodeData,
    tag_name: String,
    attributes: Vec<(String, String)>,
    style: CssStyleDeclaration,
}

/// `new Element(tagName)`.
pub fn construct(
    scope: &mut BindingScope<'_>,
    args: &[NativeValue],
) -> Result<Box<dyn NativeNode>, ScriptError> {
    let tag = match args.first() {
        Some(NativeValue::String(tag)) if !tag.is_empty() => tag.clone(),
        _ => {
            return Err(ScriptError::type_error(
                "Element constructor requires a tag name",
            ))
        }
    };
    scope.enqueue_creation(CommandType::CreateElement, vec![tag.clone()])?;
    Ok(Box::new(Element {
        node: NodeData::new(scope.target, NodeType::Element),
        tag_name: tag.to_string_lossy().to_ascii_uppercase(),
        attributes: Vec::new(),
        style: CssStyleDeclaration::new(scope.target),
    }))
}

impl Element {
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.attributes
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(
        &mut self,
        name: &str,
        value: &str,
        scope: &mut BindingScope<'_>,
    ) -> Result<(), ScriptError> {
        let name = name.to_ascii_lowercase();
        if name == "style" {
            self.style.set_css_text(value, scope.commands)?;
        }
        match self.attributes.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attributes.push((name.clone(), value.to_string())),
        }
        scope.enqueue(
            CommandType::SetAttribute,
            vec![NativeString::from(name), NativeString::from(value)],
        )
    }

    pub fn remove_attribute(
        &mut self,
        name: &str,
        scope: &mut BindingScope<'_>,
    ) -> Result<(), ScriptError> {
        let name = name.to_ascii_lowercase();
        let Some(index) = self.attributes.iter().position(|(existing, _)| *existing == name)
        else {
            return Ok(());
        };
        self.attributes.remove(index);
        if name == "style" {
            self.style.set_css_text("", scope.commands)?;
        }
        scope.enqueue(CommandType::RemoveAttribute, vec![NativeString::from(name)])
    }

    fn required_arg(args: &[NativeValue], count: usize, method: &str) -> Result<(), ScriptError> {
        if args.len() < count {
            return Err(ScriptError::type_error(format!(
                "Failed to execute '{method}' on 'Element': {count} argument(s) required, but only {} present",
                args.len()
            )));
        }
        Ok(())
    }
}

impl NativeNode for Element {
    fn node(&self) -> &NodeData {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeData {
        &mut self.node
    }

    fn node_name(&self) -> &str {
        &self.tag_name
    }

    fn get_property(&self, name: &str, _heap: &dyn ScriptHeap) -> Option<NativeValue> {
        match name {
            "tagName" | "nodeName" => Some(NativeValue::string(self.tag_name.as_str())),
            "style" => Some(NativeValue::Style(self.node.target)),
            _ => None,
        }
    }

    fn set_property(
        &mut self,
        name: &str,
        value: &NativeValue,
        scope: &mut BindingScope<'_>,
    ) -> Result<SetOutcome, ScriptError> {
        match name {
            "tagName" | "nodeName" => Ok(SetOutcome::ReadOnly),
            "style" => {
                let text = value.to_native_string().to_string_lossy();
                self.style.set_css_text(&text, scope.commands)?;
                Ok(SetOutcome::Done)
            }
            "textContent" => Ok(SetOutcome::Continue),
            name if READ_ONLY_BASE_NAMES.contains(&name) => Ok(SetOutcome::Continue),
            name => {
                scope.enqueue(
                    CommandType::SetProperty,
                    vec![NativeString::from(name), value.to_native_string()],
                )?;
                Ok(SetOutcome::Continue)
            }
        }
    }

    fn delete_property(
        &mut self,
        name: &str,
        scope: &mut BindingScope<'_>,
    ) -> Result<(), ScriptError> {
        if self.node.expando(name).is_some() {
            scope.enqueue(CommandType::RemoveProperty, vec![NativeString::from(name)])?;
        }
        Ok(())
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[NativeValue],
        scope: &mut BindingScope<'_>,
    ) -> Option<Result<Option<NativeValue>, ScriptError>> {
        let result = match name {
            "setAttribute" => Self::required_arg(args, 2, name).and_then(|()| {
                let key = string_arg(args, 0).to_string_lossy();
                let value = string_arg(args, 1).to_string_lossy();
                self.set_attribute(&key, &value, scope).map(|()| None)
            }),
            "getAttribute" => Self::required_arg(args, 1, name).map(|()| {
                let key = string_arg(args, 0).to_string_lossy();
                let value = if key.eq_ignore_ascii_case("style") && self.style.length() > 0 {
                    Some(self.style.css_text())
                } else {
                    self.attribute(&key).map(str::to_string)
                };
                Some(value.map(NativeValue::from).unwrap_or(NativeValue::Null))
            }),
            "removeAttribute" => Self::required_arg(args, 1, name).and_then(|()| {
                let key = string_arg(args, 0).to_string_lossy();
                self.remove_attribute(&key, scope).map(|()| None)
            }),
            "hasAttribute" => Self::required_arg(args, 1, name).map(|()| {
                let key = string_arg(args, 0).to_string_lossy();
                Some(NativeValue::Bool(self.attribute(&key).is_some()))
            }),
            _ => return None,
        };
        Some(result)
    }

    fn style(&self) -> Option<&CssStyleDeclaration> {
        Some(&self.style)
    }

    fn style_mut(&mut self) -> Option<&mut CssStyleDeclaration> {
        Some(&mut self.style)
    }

    fn accepts_children(&self) -> bool {
        true
    }
}

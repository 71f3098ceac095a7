use std::fmt;

use crate::binding::ScriptError;
use crate::foundation::{CommandBuffer, CommandError, CommandType, NativeString, NativeValue, TargetId};

/// Inline style map of one element.
///
/// The declaration has no identity of its own on the host side: every
/// mutation is queued as a `setStyle` command addressed to the owning
/// element, with an empty value meaning removal.
#[derive(Debug, Clone)]
pub struct CssStyleDeclaration {
    owner: TargetId,
    properties: Vec<(String, NativeString)>,
}

impl CssStyleDeclaration {
    pub fn new(owner: TargetId) -> Self {
        Self {
            owner,
            properties: Vec::new(),
        }
    }

    pub fn owner(&self) -> TargetId {
        self.owner
    }

    pub fn length(&self) -> usize {
        self.properties.len()
    }

    /// Name at `index` in insertion order, or empty when out of range.
    pub fn item(&self, index: usize) -> String {
        self.properties
            .get(index)
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    }

    pub fn get_property_value(&self, name: &str) -> NativeString {
        let name = normalize_name(name);
        self.position(&name)
            .map(|index| self.properties[index].1.clone())
            .unwrap_or_default()
    }

    pub fn set_property(
        &mut self,
        name: &str,
        value: NativeString,
        commands: &mut CommandBuffer,
    ) -> Result<(), CommandError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Ok(());
        }
        if value.is_empty() {
            self.remove_property(&name, commands)?;
            return Ok(());
        }
        match self.position(&name) {
            Some(index) => self.properties[index].1 = value.clone(),
            None => self.properties.push((name.clone(), value.clone())),
        }
        commands.append(
            self.owner,
            CommandType::SetStyle,
            vec![NativeString::from(name), value],
            None,
        )
    }

    /// Remove `name` and return its prior value, or empty when it was not
    /// set. Only an actual removal is mirrored to the host.
    pub fn remove_property(
        &mut self,
        name: &str,
        commands: &mut CommandBuffer,
    ) -> Result<NativeString, CommandError> {
        let name = normalize_name(name);
        let Some(index) = self.position(&name) else {
            return Ok(NativeString::new());
        };
        let (name, previous) = self.properties.remove(index);
        commands.append(
            self.owner,
            CommandType::SetStyle,
            vec![NativeString::from(name), NativeString::new()],
            None,
        )?;
        Ok(previous)
    }

    /// `name: value;` pairs in insertion order, separated by a space.
    pub fn css_text(&self) -> String {
        self.properties
            .iter()
            .map(|(name, value)| format!("{name}: {value};"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Replace every declaration with the ones parsed from `text`.
    pub fn set_css_text(
        &mut self,
        text: &str,
        commands: &mut CommandBuffer,
    ) -> Result<(), CommandError> {
        let existing: Vec<String> = self.properties.iter().map(|(name, _)| name.clone()).collect();
        for name in existing {
            self.remove_property(&name, commands)?;
        }
        for declaration in text.split(';') {
            let Some((name, value)) = declaration.split_once(':') else {
                continue;
            };
            self.set_property(name, NativeString::from(value.trim()), commands)?;
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }

    /// Script-facing entry point: one operation of the declaration's
    /// interface by name.
    pub fn invoke(
        &mut self,
        op: &str,
        args: &[NativeValue],
        commands: &mut CommandBuffer,
    ) -> Result<NativeValue, ScriptError> {
        let text = |index: usize| -> NativeString {
            args.get(index)
                .map(NativeValue::to_native_string)
                .unwrap_or_default()
        };
        match op {
            "item" => {
                let index = args.first().and_then(NativeValue::as_index);
                Ok(NativeValue::string(
                    index.map(|index| self.item(index)).unwrap_or_default(),
                ))
            }
            "length" => Ok(NativeValue::Int64(self.length() as i64)),
            "getPropertyValue" => Ok(NativeValue::String(
                self.get_property_value(&text(0).to_string_lossy()),
            )),
            "setProperty" => {
                self.set_property(&text(0).to_string_lossy(), text(1), commands)?;
                Ok(NativeValue::Null)
            }
            "removeProperty" => Ok(NativeValue::String(
                self.remove_property(&text(0).to_string_lossy(), commands)?,
            )),
            "cssText" | "toString" => Ok(NativeValue::string(self.css_text())),
            "setCssText" => {
                self.set_css_text(&text(0).to_string_lossy(), commands)?;
                Ok(NativeValue::Null)
            }
            "keys" => Ok(NativeValue::Json(serde_json::to_string(
                &self.names().collect::<Vec<_>>(),
            )?)),
            other => Err(ScriptError::type_error(format!(
                "CSSStyleDeclaration has no operation '{other}'"
            ))),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|(existing, _)| existing == name)
    }
}

impl fmt::Display for CssStyleDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.css_text())
    }
}

/// `backgroundColor` and `background-color` name the same property. Custom
/// properties keep their spelling.
fn normalize_name(name: &str) -> String {
    let name = name.trim();
    if name.starts_with("--") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

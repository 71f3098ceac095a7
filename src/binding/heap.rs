use std::collections::HashMap;

use crate::foundation::NativeString;

/// Handle to a string held by an engine's heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(u32);

/// String storage capability an engine backend hands to the binding layer.
///
/// Reference counts are caller-managed: `intern` returns a handle that is
/// already retained once, and every retain must be paired with a release.
pub trait ScriptHeap {
    fn intern(&mut self, value: &NativeString) -> Atom;
    fn retain(&mut self, atom: Atom);
    fn release(&mut self, atom: Atom);
    fn resolve(&self, atom: Atom) -> Option<&NativeString>;
    /// Number of strings currently holding at least one reference.
    fn live_strings(&self) -> usize;
}

struct AtomEntry {
    value: NativeString,
    refs: u32,
}

/// Deduplicating atom table: interning an equal string again bumps the count
/// on the existing entry.
#[derive(Default)]
pub struct AtomTable {
    entries: Vec<Option<AtomEntry>>,
    lookup: HashMap<NativeString, Atom>,
    free: Vec<u32>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ref_count(&self, atom: Atom) -> u32 {
        self.entry(atom).map(|entry| entry.refs).unwrap_or(0)
    }

    fn entry(&self, atom: Atom) -> Option<&AtomEntry> {
        self.entries.get(atom.0 as usize).and_then(Option::as_ref)
    }
}

impl ScriptHeap for AtomTable {
    fn intern(&mut self, value: &NativeString) -> Atom {
        if let Some(&atom) = self.lookup.get(value) {
            self.retain(atom);
            return atom;
        }
        let entry = AtomEntry {
            value: value.clone(),
            refs: 1,
        };
        let atom = match self.free.pop() {
            Some(slot) => {
                self.entries[slot as usize] = Some(entry);
                Atom(slot)
            }
            None => {
                self.entries.push(Some(entry));
                Atom((self.entries.len() - 1) as u32)
            }
        };
        self.lookup.insert(value.clone(), atom);
        atom
    }

    fn retain(&mut self, atom: Atom) {
        match self.entries.get_mut(atom.0 as usize).and_then(Option::as_mut) {
            Some(entry) => entry.refs += 1,
            None => tracing::warn!(target: "bridge", ?atom, "retain of a freed atom"),
        }
    }

    fn release(&mut self, atom: Atom) {
        let slot = atom.0 as usize;
        let Some(entry) = self.entries.get_mut(slot).and_then(Option::as_mut) else {
            tracing::warn!(target: "bridge", ?atom, "release of a freed atom");
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            if let Some(entry) = self.entries[slot].take() {
                self.lookup.remove(&entry.value);
            }
            self.free.push(atom.0);
        }
    }

    fn resolve(&self, atom: Atom) -> Option<&NativeString> {
        self.entry(atom).map(|entry| &entry.value)
    }

    fn live_strings(&self) -> usize {
        self.lookup.len()
    }
}

/// Non-deduplicating string arena: every intern creates a fresh
/// reference-counted string, the way string references are created from
/// values one by one.
#[derive(Default)]
pub struct StringArena {
    slots: Vec<Option<(NativeString, u32)>>,
    free: Vec<u32>,
    live: usize,
}

impl StringArena {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptHeap for StringArena {
    fn intern(&mut self, value: &NativeString) -> Atom {
        self.live += 1;
        let slot = (value.clone(), 1);
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                Atom(index)
            }
            None => {
                self.slots.push(Some(slot));
                Atom((self.slots.len() - 1) as u32)
            }
        }
    }

    fn retain(&mut self, atom: Atom) {
        match self.slots.get_mut(atom.0 as usize).and_then(Option::as_mut) {
            Some((_, refs)) => *refs += 1,
            None => tracing::warn!(target: "bridge", ?atom, "retain of a freed string"),
        }
    }

    fn release(&mut self, atom: Atom) {
        let index = atom.0 as usize;
        let Some((_, refs)) = self.slots.get_mut(index).and_then(Option::as_mut) else {
            tracing::warn!(target: "bridge", ?atom, "release of a freed string");
            return;
        };
        *refs -= 1;
        if *refs == 0 {
            self.slots[index] = None;
            self.free.push(atom.0);
            self.live -= 1;
        }
    }

    fn resolve(&self, atom: Atom) -> Option<&NativeString> {
        self.slots
            .get(atom.0 as usize)
            .and_then(Option::as_ref)
            .map(|(value, _)| value)
    }

    fn live_strings(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_table_deduplicates() {
        let mut table = AtomTable::new();
        let first = table.intern(&NativeString::from("color"));
        let second = table.intern(&NativeString::from("color"));
        assert_eq!(first, second);
        assert_eq!(table.ref_count(first), 2);

        table.release(first);
        assert_eq!(table.resolve(first).map(|s| s.to_string_lossy()), Some("color".into()));
        table.release(second);
        assert!(table.resolve(first).is_none());
        assert_eq!(table.live_strings(), 0);
    }

    #[test]
    fn arena_keeps_separate_references() {
        let mut arena = StringArena::new();
        let first = arena.intern(&NativeString::from("a"));
        let second = arena.intern(&NativeString::from("a"));
        assert_ne!(first, second);
        arena.retain(first);
        arena.release(first);
        arena.release(second);
        assert_eq!(arena.live_strings(), 1);
        arena.release(first);
        assert_eq!(arena.live_strings(), 0);
    }

    #[test]
    fn releasing_a_freed_atom_is_ignored() {
        let mut table = AtomTable::new();
        let atom = table.intern(&NativeString::from("x"));
        table.release(atom);
        table.release(atom);
        assert_eq!(table.live_strings(), 0);
    }
}

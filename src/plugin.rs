use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::context::BridgeError;
use crate::foundation::NativeString;

#[derive(Debug, Clone, PartialEq)]
pub enum PluginCode {
    ByteCode(Arc<[u8]>),
    Source(NativeString),
}

/// Named plugin code evaluated in every new surface.
///
/// Registration is only accepted until the first surface is created; from
/// then on the registry is read-only.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<String, PluginCode>>,
    sealed: AtomicBool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_byte_code(&self, name: &str, bytes: &[u8]) -> Result<(), BridgeError> {
        self.register(name, PluginCode::ByteCode(Arc::from(bytes)))
    }

    pub fn register_source(&self, name: &str, source: NativeString) -> Result<(), BridgeError> {
        self.register(name, PluginCode::Source(source))
    }

    fn register(&self, name: &str, code: PluginCode) -> Result<(), BridgeError> {
        if self.is_sealed() {
            return Err(BridgeError::PluginRegistrySealed(name.to_string()));
        }
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.insert(name.to_string(), code).is_some() {
            tracing::warn!(target: "bridge", plugin = name, "plugin replaced");
        }
        Ok(())
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plugins in name order.
    pub fn snapshot(&self) -> Vec<(String, PluginCode)> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, code)| (name.clone(), code.clone()))
            .collect()
    }
}

static GLOBAL: OnceLock<Arc<PluginRegistry>> = OnceLock::new();

/// Process-wide registry the host boundary registers into.
pub fn global() -> Arc<PluginRegistry> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(PluginRegistry::new())))
}

use std::sync::Arc;

/// Errors raised while registering or resolving named plug-ins.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("'{0}' is already registered")]
    Duplicate(String),

    #[error("unknown plug-in '{0}'")]
    Unknown(String),
}

/// Named plug-ins kept in registration order.
///
/// Registration order is observable: the scatter-gather merge groups evidence by it.
pub struct Registry<T: ?Sized> {
    entries: Vec<(String, Arc<T>)>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<T>) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.iter().any(|(n, _)| *n == name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.entries.push((name, plugin));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| Arc::clone(p))
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `enabled` (or everything when `None`) in registration order.
    pub fn resolve<'a, I>(&self, enabled: Option<I>) -> Result<Vec<(String, Arc<T>)>, RegistryError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let Some(enabled) = enabled else {
            return Ok(self.entries.clone());
        };
        let wanted: Vec<&String> = enabled.into_iter().collect();
        if let Some(missing) = wanted.iter().find(|w| !self.entries.iter().any(|(n, _)| n == **w)) {
            return Err(RegistryError::Unknown((*missing).clone()));
        }
        Ok(self
            .entries
            .iter()
            .filter(|(n, _)| wanted.contains(&n))
            .cloned()
            .collect())
    }
}

//! Bookkeeping for hook installation
//!
//! Each compatibility feature is installed on its own: a feature that fails
//! is reported and left out, the others still go in.

/// Result of installing one feature
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum FeatureOutcome<T> {
    /// The configuration did not ask for it
    #[default]
    Skipped,
    Installed(T),
    /// Nothing of the feature stays installed
    Failed(String),
}

impl<T> FeatureOutcome<T> {
    pub fn installed(&self) -> Option<&T> {
        match self {
            Self::Installed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What `hooks::install` ended up hooking
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstalledHooks {
    /// Name of the reported Windows release
    pub version_lie: FeatureOutcome<&'static str>,
    /// Exports that yield on busy waits
    pub busy_wait: FeatureOutcome<Vec<&'static str>>,
}

/// Attach every item in order, or none of them
///
/// When one item fails, the items already attached are detached again in
/// reverse order and the failure is returned.
pub fn attach_all_or_none<T, E>(
    items: &[T],
    mut attach: impl FnMut(&T) -> Result<(), E>,
    mut detach: impl FnMut(&T),
) -> Result<(), E> {
    for (done, item) in items.iter().enumerate() {
        if let Err(e) = attach(item) {
            for attached in items[..done].iter().rev() {
                detach(attached);
            }
            return Err(e);
        }
    }
    Ok(())
}

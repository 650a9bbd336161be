//! Remote property cache cells
//!
//! Every value mirrored from a daemon lives in a [`RemoteProperty`]: the
//! last applied value plus the write discipline for mutations. Two
//! disciplines coexist in the system:
//!
//! - **Confirm-then-cache**: the cache is updated only after the write
//!   completes successfully. On failure the cache is untouched.
//! - **Optimistic-then-send**: the cache is updated (and the changed event
//!   raised) immediately, then the write is issued. A later failure raises
//!   an error but the cache is not rolled back. That is the chosen behavior,
//!   not an oversight: the next fetch or push notification re-converges the
//!   cache with daemon reality.
//!
//! Fetches and unsolicited push notifications go through [`RemoteProperty::apply`],
//! which suppresses events for unchanged values.
//!
//! Completions are applied in arrival order with no sequence guard; a stale
//! fetch that lands after a newer write overwrites it (last-completion-wins).

use ch_error::{PanelError, Result};

/// Write discipline for a mutable remote property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Update the cache only after the write completes successfully
    ConfirmThenCache,
    /// Update the cache immediately, then issue the write
    OptimisticThenSend,
}

/// A locally cached view of one named remote property
#[derive(Debug, Clone)]
pub struct RemoteProperty<T> {
    name: &'static str,
    value: Option<T>,
    policy: WritePolicy,
}

impl<T: PartialEq + Clone> RemoteProperty<T> {
    pub fn new(name: &'static str, policy: WritePolicy) -> Self {
        Self {
            name,
            value: None,
            policy,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Last applied value, if any fetch/notification/write has landed yet
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Apply a fetched or pushed value. Returns true if the cache changed
    /// (the caller raises its changed event only then).
    pub fn apply(&mut self, value: T) -> bool {
        if self.value.as_ref() == Some(&value) {
            return false;
        }
        self.value = Some(value);
        true
    }

    /// Begin a write. Under the optimistic discipline this applies the value
    /// now; the return says whether the caller should raise a changed event
    /// immediately.
    pub fn begin_write(&mut self, value: &T) -> bool {
        match self.policy {
            WritePolicy::OptimisticThenSend => self.apply(value.clone()),
            WritePolicy::ConfirmThenCache => false,
        }
    }

    /// Finish a write whose command completed successfully. Under the
    /// confirm discipline this applies the value now; the return says
    /// whether to raise a changed event.
    pub fn finish_write(&mut self, value: T) -> bool {
        match self.policy {
            WritePolicy::ConfirmThenCache => self.apply(value),
            // Already applied in begin_write; nothing to do on confirmation
            WritePolicy::OptimisticThenSend => false,
        }
    }

    /// Drop the cached value (service went away)
    pub fn clear(&mut self) {
        self.value = None;
    }
}

// ============================================================================
// Sub-Resource Discovery
// ============================================================================

/// A lazily resolved object path for a property group whose location is not
/// fixed at startup (the lamp device registers under a hardware-specific
/// child of a well-known parent).
///
/// Resolved once via introspection and cached for the process lifetime.
/// A call against the cached path failing with a not-found-class error
/// invalidates it, after which discovery re-runs and the call is retried
/// once.
#[derive(Debug, Clone)]
pub struct SubResource {
    parent: &'static str,
    resolved: Option<String>,
    failed: bool,
}

impl SubResource {
    pub fn new(parent: &'static str) -> Self {
        Self {
            parent,
            resolved: None,
            failed: false,
        }
    }

    pub fn parent(&self) -> &'static str {
        self.parent
    }

    /// The concrete path, once discovery has succeeded
    pub fn path(&self) -> Option<&str> {
        self.resolved.as_deref()
    }

    /// Whether discovery ran and failed. While true, every property under
    /// this resource reports unavailable instead of failing individually.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn needs_discovery(&self) -> bool {
        self.resolved.is_none() && !self.failed
    }

    /// Record a discovery result. On success returns the resolved path.
    pub fn resolve(&mut self, description: Result<String>) -> Option<&str> {
        match description.and_then(|xml| first_child_node(self.parent, &xml)) {
            Ok(path) => {
                tracing::debug!(parent = self.parent, path = %path, "Sub-resource resolved");
                self.failed = false;
                self.resolved = Some(path);
                self.resolved.as_deref()
            }
            Err(e) => {
                tracing::warn!(parent = self.parent, "Sub-resource discovery failed: {}", e);
                self.failed = true;
                self.resolved = None;
                None
            }
        }
    }

    /// Forget the cached path so the next access re-runs discovery
    pub fn invalidate(&mut self) {
        self.resolved = None;
        self.failed = false;
    }
}

/// Extract the first child node name from an introspection description and
/// join it onto the parent path.
fn first_child_node(parent: &str, description: &str) -> Result<String> {
    let re = regex::Regex::new(r#"node name="([^"]+)""#)
        .map_err(|e| PanelError::DiscoveryFailed(format!("bad node pattern: {}", e)))?;
    let name = re
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            PanelError::DiscoveryFailed(format!("no child nodes under {}", parent))
        })?;
    Ok(format!("{}/{}", parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_deduplicates() {
        let mut prop = RemoteProperty::new("PlatformProfile", WritePolicy::ConfirmThenCache);
        assert!(!prop.has_value());
        assert!(prop.apply(1u32));
        assert!(!prop.apply(1u32), "same value must not report a change");
        assert!(prop.apply(2u32));
        assert_eq!(prop.get(), Some(&2));
    }

    #[test]
    fn test_confirm_then_cache_discipline() {
        let mut prop = RemoteProperty::new("ChargeLimit", WritePolicy::ConfirmThenCache);
        prop.apply(100u8);

        // Nothing changes until the command completes
        assert!(!prop.begin_write(&80));
        assert_eq!(prop.get(), Some(&100));

        // Success applies the value
        assert!(prop.finish_write(80));
        assert_eq!(prop.get(), Some(&80));
    }

    #[test]
    fn test_optimistic_discipline_no_rollback() {
        let mut prop = RemoteProperty::new("Brightness", WritePolicy::OptimisticThenSend);
        prop.apply(2u32);

        // Cache moves before the command is even issued
        assert!(prop.begin_write(&3));
        assert_eq!(prop.get(), Some(&3));

        // A failed command leaves the optimistic value in place; the caller
        // raises an error event but performs no rollback
        assert_eq!(prop.get(), Some(&3));

        // A confirmation is a no-op (already applied)
        assert!(!prop.finish_write(3));
    }

    #[test]
    fn test_first_child_node_parse() {
        let xml = r#"<node>
  <node name="19b6_3_4"/>
  <node name="other"/>
</node>"#;
        let path = first_child_node("/io/chassis/lamp", xml).expect("parse");
        assert_eq!(path, "/io/chassis/lamp/19b6_3_4");
    }

    #[test]
    fn test_sub_resource_lifecycle() {
        let mut sub = SubResource::new("/io/chassis/lamp");
        assert!(sub.needs_discovery());

        sub.resolve(Ok(r#"<node name="19b6_3_4"/>"#.to_string()));
        assert_eq!(sub.path(), Some("/io/chassis/lamp/19b6_3_4"));
        assert!(!sub.needs_discovery());

        // A not-found failure invalidates the path; discovery becomes due again
        sub.invalidate();
        assert!(sub.needs_discovery());
        assert_eq!(sub.path(), None);
    }

    #[test]
    fn test_sub_resource_failure_marks_unavailable() {
        let mut sub = SubResource::new("/io/chassis/lamp");
        sub.resolve(Err(PanelError::CallFailed("timed out".to_string())));
        assert!(sub.is_failed());
        assert!(!sub.needs_discovery());
        assert_eq!(sub.path(), None);

        // Empty description means no children: also a discovery failure
        let mut sub = SubResource::new("/io/chassis/lamp");
        sub.resolve(Ok("<node></node>".to_string()));
        assert!(sub.is_failed());
    }
}

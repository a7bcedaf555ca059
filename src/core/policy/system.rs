//! Systems: named collections of groups, loaded eagerly or on first access

use super::{JitGroupPolicy, Policy, PolicyNode};
use crate::core::error::PolicyError;
use crate::core::events;
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Produces the groups of a system on first access
pub trait GroupLoader: Send + Sync {
    fn load(&self, system: &str) -> Result<Vec<JitGroupPolicy>, PolicyError>;
}

enum Groups {
    Owned(BTreeMap<String, JitGroupPolicy>),
    Lazy {
        loader: Box<dyn GroupLoader>,
        loaded: OnceCell<Result<BTreeMap<String, JitGroupPolicy>, PolicyError>>,
    },
}

/// A system within an environment, containing groups
///
/// Groups are either added explicitly or, for lazily loaded systems,
/// produced once by a [`GroupLoader`]. The loader runs at most once even
/// under concurrent first access; every caller observes its result,
/// including a failure, for the lifetime of the system.
pub struct SystemPolicy {
    node: PolicyNode,
    groups: Groups,
}

impl SystemPolicy {
    pub fn new(node: PolicyNode) -> Self {
        SystemPolicy {
            node,
            groups: Groups::Owned(BTreeMap::new()),
        }
    }

    /// System whose groups are loaded on first access; `add` is rejected
    pub fn lazy(node: PolicyNode, loader: Box<dyn GroupLoader>) -> Self {
        SystemPolicy {
            node,
            groups: Groups::Lazy {
                loader,
                loaded: OnceCell::new(),
            },
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.groups, Groups::Lazy { .. })
    }

    /// Add a group, failing if a sibling already has its name
    pub fn add(&mut self, group: JitGroupPolicy) -> Result<(), PolicyError> {
        match &mut self.groups {
            Groups::Owned(groups) => {
                if groups.contains_key(group.name()) {
                    return Err(PolicyError::DuplicateName(group.name().to_string()));
                }
                groups.insert(group.name().to_string(), group);
                Ok(())
            }
            Groups::Lazy { .. } => Err(PolicyError::ReadOnly(self.node.name().to_string())),
        }
    }

    /// Builder-style variant of [`SystemPolicy::add`]
    pub fn with_group(mut self, group: JitGroupPolicy) -> Result<Self, PolicyError> {
        self.add(group)?;
        Ok(self)
    }

    /// All groups, ordered by name
    pub fn groups(&self) -> Result<Vec<&JitGroupPolicy>, PolicyError> {
        Ok(self.group_map()?.values().collect())
    }

    /// Look up a group by name (case-sensitive)
    pub fn group(&self, name: &str) -> Result<Option<&JitGroupPolicy>, PolicyError> {
        Ok(self.group_map()?.get(name))
    }

    fn group_map(&self) -> Result<&BTreeMap<String, JitGroupPolicy>, PolicyError> {
        match &self.groups {
            Groups::Owned(groups) => Ok(groups),
            Groups::Lazy { loader, loaded } => loaded
                .get_or_init(|| self.load(loader.as_ref()))
                .as_ref()
                .map_err(Clone::clone),
        }
    }

    fn load(&self, loader: &dyn GroupLoader) -> Result<BTreeMap<String, JitGroupPolicy>, PolicyError> {
        let system = self.node.name();
        let groups = loader.load(system).map_err(|e| {
            warn!(event = events::POLICY_LAZY_LOAD, system, error = %e, "loading groups failed");
            e
        })?;

        let mut map = BTreeMap::new();
        for group in groups {
            if map.contains_key(group.name()) {
                return Err(PolicyError::DuplicateName(group.name().to_string()));
            }
            map.insert(group.name().to_string(), group);
        }

        debug!(event = events::POLICY_LAZY_LOAD, system, groups = map.len(), "loaded groups");
        Ok(map)
    }
}

impl Policy for SystemPolicy {
    fn node(&self) -> &PolicyNode {
        &self.node
    }
}

impl fmt::Debug for SystemPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SystemPolicy");
        s.field("node", &self.node);
        match &self.groups {
            Groups::Owned(groups) => s.field("groups", &groups.keys().collect::<Vec<_>>()),
            Groups::Lazy { loaded, .. } => s.field("loaded", &loaded.get().is_some()),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn group(name: &str) -> JitGroupPolicy {
        JitGroupPolicy::new(PolicyNode::new(name, "").unwrap())
    }

    struct CountingLoader {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl GroupLoader for CountingLoader {
        fn load(&self, system: &str) -> Result<Vec<JitGroupPolicy>, PolicyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PolicyError::Loader {
                    system: system.to_string(),
                    message: "backend unavailable".to_string(),
                });
            }
            Ok(vec![group("a"), group("b")])
        }
    }

    fn lazy(fail: bool) -> (SystemPolicy, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let system = SystemPolicy::lazy(
            PolicyNode::new("sys", "").unwrap(),
            Box::new(CountingLoader {
                calls: Arc::clone(&calls),
                fail,
            }),
        );
        (system, calls)
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut system = SystemPolicy::new(PolicyNode::new("sys", "").unwrap());
        system.add(group("a")).unwrap();
        assert!(matches!(
            system.add(group("a")),
            Err(PolicyError::DuplicateName(_))
        ));
        assert!(system.group("a").unwrap().is_some());
        assert!(system.group("A").unwrap().is_none());
    }

    #[test]
    fn test_lazy_loads_once() {
        let (system, calls) = lazy(false);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(system.groups().unwrap().len(), 2);
        assert!(system.group("b").unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_rejects_add() {
        let (mut system, _) = lazy(false);
        assert!(matches!(system.add(group("c")), Err(PolicyError::ReadOnly(_))));
    }

    #[test]
    fn test_lazy_error_is_memoized() {
        let (system, calls) = lazy(true);
        assert!(matches!(system.groups(), Err(PolicyError::Loader { .. })));
        assert!(matches!(system.group("a"), Err(PolicyError::Loader { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_duplicate_groups_fail_load() {
        struct Duplicates;
        impl GroupLoader for Duplicates {
            fn load(&self, _: &str) -> Result<Vec<JitGroupPolicy>, PolicyError> {
                Ok(vec![group("a"), group("a")])
            }
        }

        let system = SystemPolicy::lazy(PolicyNode::new("sys", "").unwrap(), Box::new(Duplicates));
        assert!(matches!(system.groups(), Err(PolicyError::DuplicateName(_))));
    }
}

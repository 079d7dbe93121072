//! Module: model::chain
//! Responsibility: ordered, deduplicated nesting of modules used by search,
//! export and validation.
//! Does not own: loading records along the chain (see `walk`).
//!
//! Invariant: every module's ancestors precede it, and the descendants of a
//! module form one contiguous block directly after it.

use crate::model::{
    FieldError,
    module::{ModuleDescriptor, ModuleRegistry},
};
use std::fmt;

///
/// ModuleChain
///

#[derive(Clone, Default, Eq, PartialEq)]
pub struct ModuleChain {
    modules: Vec<&'static ModuleDescriptor>,
}

impl ModuleChain {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Chain whose top is `module`, even when `module` itself has a parent.
    /// Ancestors of the top are never pulled in afterwards.
    #[must_use]
    pub fn starting_at(module: &'static ModuleDescriptor) -> Self {
        Self {
            modules: vec![module],
        }
    }

    /// Add a module, pulling in its missing ancestors first. Adding a module
    /// already present is a no-op.
    ///
    /// A module lands at the end of its parent's subtree, so sibling ties are
    /// broken by insertion order.
    pub fn add(
        &mut self,
        registry: &ModuleRegistry,
        module: &'static ModuleDescriptor,
    ) -> Result<&mut Self, FieldError> {
        if self.contains(module.name) {
            return Ok(self);
        }

        let Some(parent_name) = module.parent_name() else {
            self.modules.push(module);
            return Ok(self);
        };

        let parent = registry.require(parent_name)?;
        self.add(registry, parent)?;

        let insert_at = self.subtree_end(parent.name);
        self.modules.insert(insert_at, module);

        Ok(self)
    }

    /// Add by module name.
    pub fn add_named(
        &mut self,
        registry: &ModuleRegistry,
        name: &str,
    ) -> Result<&mut Self, FieldError> {
        let module = registry.require(name)?;
        self.add(registry, module)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static ModuleDescriptor> {
        self.modules.iter().copied().find(|m| m.name == name)
    }

    #[must_use]
    pub fn root(&self) -> Option<&'static ModuleDescriptor> {
        self.modules.first().copied()
    }

    #[must_use]
    pub fn at(&self, position: usize) -> Option<&'static ModuleDescriptor> {
        self.modules.get(position).copied()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static ModuleDescriptor> + '_ {
        self.modules.iter().copied()
    }

    /// SQL alias for a module: `m<position>`.
    #[must_use]
    pub fn alias(&self, name: &str) -> Option<String> {
        self.position(name).map(|pos| format!("m{pos}"))
    }

    /// Every later module descending from `name`, in chain order.
    #[must_use]
    pub fn child_modules(&self, name: &str) -> Vec<&'static ModuleDescriptor> {
        let Some(start) = self.position(name) else {
            return Vec::new();
        };

        self.modules[start + 1..self.subtree_end(name)].to_vec()
    }

    /// Modules whose parent is `name`, in chain order.
    #[must_use]
    pub fn direct_children(&self, name: &str) -> Vec<&'static ModuleDescriptor> {
        self.child_modules(name)
            .into_iter()
            .filter(|m| m.parent_name() == Some(name))
            .collect()
    }

    /// Ancestors of `name` from the root down, excluding `name` itself.
    #[must_use]
    pub fn ancestors(&self, name: &str) -> Vec<&'static ModuleDescriptor> {
        let mut out = Vec::new();
        let mut cursor = self.get(name).and_then(ModuleDescriptor::parent_name);

        while let Some(parent_name) = cursor {
            let Some(parent) = self.get(parent_name) else {
                break;
            };
            out.push(parent);
            cursor = parent.parent_name();
        }
        out.reverse();

        out
    }

    /// Nesting depth: 0 for a root.
    #[must_use]
    pub fn depth(&self, name: &str) -> usize {
        self.ancestors(name).len()
    }

    /// Whether `name` descends (transitively) from `ancestor`.
    #[must_use]
    pub fn descends_from(&self, name: &str, ancestor: &str) -> bool {
        self.ancestors(name).iter().any(|m| m.name == ancestor)
    }

    // One past the last index of the contiguous subtree rooted at `name`.
    fn subtree_end(&self, name: &str) -> usize {
        let Some(start) = self.position(name) else {
            return self.modules.len();
        };

        let mut end = start + 1;
        while end < self.modules.len() && self.descends_from(self.modules[end].name, name) {
            end += 1;
        }

        end
    }
}

impl fmt::Debug for ModuleChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|m| m.name))
            .finish()
    }
}

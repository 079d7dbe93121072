//! Module: model::module
//! Responsibility: static entity-type declarations and their parent links.
//! Does not own: chain ordering (see `model::chain`).

use crate::model::{FieldError, chain::ModuleChain};

///
/// ModuleDescriptor
///
/// One addressable entity type. Declared as a `static` by the host
/// application, the same way entity models are declared once and referenced
/// everywhere by pointer.
///

#[derive(Debug, Eq, PartialEq)]
pub struct ModuleDescriptor {
    /// Stable name; also the `customizable_type` tag in the custom value store.
    pub name: &'static str,
    pub label: &'static str,
    pub table: &'static str,
    pub parent: Option<ParentLink>,
}

impl ModuleDescriptor {
    #[must_use]
    pub const fn root(name: &'static str, label: &'static str, table: &'static str) -> Self {
        Self {
            name,
            label,
            table,
            parent: None,
        }
    }

    #[must_use]
    pub const fn child(
        name: &'static str,
        label: &'static str,
        table: &'static str,
        parent: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            table,
            parent: Some(ParentLink {
                module: parent,
                foreign_key,
            }),
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[must_use]
    pub fn parent_name(&self) -> Option<&'static str> {
        self.parent.as_ref().map(|link| link.module)
    }
}

///
/// ParentLink
///
/// The one-to-many edge from a parent module: child rows carry the parent's
/// id in `foreign_key`.
///

#[derive(Debug, Eq, PartialEq)]
pub struct ParentLink {
    pub module: &'static str,
    pub foreign_key: &'static str,
}

///
/// ModuleRegistry
///
/// Entity graph: every registered module and its single parent. Children are
/// reported in registration order.
///

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<&'static ModuleDescriptor>,
}

impl ModuleRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a module. Its parent must already be registered so the graph
    /// can never hold a dangling edge.
    pub fn register(&mut self, module: &'static ModuleDescriptor) -> Result<(), FieldError> {
        if let Some(parent) = module.parent_name()
            && self.get(parent).is_none()
        {
            return Err(FieldError::UnknownModule {
                module: parent.to_string(),
            });
        }
        if self.get(module.name).is_none() {
            self.modules.push(module);
        }

        Ok(())
    }

    pub fn with_modules(
        modules: impl IntoIterator<Item = &'static ModuleDescriptor>,
    ) -> Result<Self, FieldError> {
        let mut registry = Self::new();
        for module in modules {
            registry.register(module)?;
        }

        Ok(registry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static ModuleDescriptor> {
        self.modules.iter().copied().find(|m| m.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&'static ModuleDescriptor, FieldError> {
        self.get(name).ok_or_else(|| FieldError::UnknownModule {
            module: name.to_string(),
        })
    }

    pub fn modules(&self) -> impl Iterator<Item = &'static ModuleDescriptor> + '_ {
        self.modules.iter().copied()
    }

    /// Default children of `name`, in registration order.
    pub fn children_of<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'static ModuleDescriptor> + 'a {
        self.modules
            .iter()
            .copied()
            .filter(move |m| m.parent_name() == Some(name))
    }

    /// True when `module` is `root` or nested anywhere below it.
    #[must_use]
    pub fn is_at_or_below(
        &self,
        module: &'static ModuleDescriptor,
        root: &'static ModuleDescriptor,
    ) -> bool {
        let mut current = Some(module);
        while let Some(m) = current {
            if m == root {
                return true;
            }
            current = m.parent_name().and_then(|name| self.get(name));
        }

        false
    }

    /// Chain topped by `root` holding every module reachable below it.
    pub fn default_chain(&self, root: &str) -> Result<ModuleChain, FieldError> {
        let root = self.require(root)?;
        let mut chain = ModuleChain::starting_at(root);
        self.extend_default(&mut chain, root)?;

        Ok(chain)
    }

    fn extend_default(
        &self,
        chain: &mut ModuleChain,
        module: &'static ModuleDescriptor,
    ) -> Result<(), FieldError> {
        for child in self.children_of(module.name) {
            chain.add(self, child)?;
            self.extend_default(chain, child)?;
        }

        Ok(())
    }
}

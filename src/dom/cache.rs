use crate::browser::page::Page;
use crate::dom::resolver::{ResolverOptions, resolve_target};
use crate::dom::target::Target;
use crate::error::Result;
use indexmap::IndexMap;
use log::debug;

/// State of a named target
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry<E> {
    /// Not looked up yet, or the last lookup found nothing
    Unresolved(String),
    /// Elements found for `target` while the page was at `generation`
    Resolved { target: String, elements: Vec<E>, generation: u64 },
}

impl<E> CacheEntry<E> {
    pub fn target(&self) -> &str {
        match self {
            CacheEntry::Unresolved(target) => target,
            CacheEntry::Resolved { target, .. } => target,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, CacheEntry::Resolved { .. })
    }
}

/// Named targets of one runtime session and the elements they resolved to
///
/// A successful lookup is kept and returned as-is for as long as the page stays on the same
/// generation. Once the page reports a newer generation the entry is looked up again.
#[derive(Debug, Clone)]
pub struct ElementCache<E> {
    entries: IndexMap<String, CacheEntry<E>>,
}

impl<E> Default for ElementCache<E> {
    fn default() -> Self {
        Self { entries: IndexMap::new() }
    }
}

impl<E: Clone> ElementCache<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with unresolved `name -> target` pairs
    pub fn from_targets<I, K, V>(targets: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = targets
            .into_iter()
            .map(|(name, target)| (name.into(), CacheEntry::Unresolved(target.into())))
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&CacheEntry<E>> {
        self.entries.get(name)
    }

    /// Bind `name` to `target`, dropping whatever it resolved to before
    pub fn set(&mut self, name: impl Into<String>, target: impl Into<String>) {
        self.entries.insert(name.into(), CacheEntry::Unresolved(target.into()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<CacheEntry<E>> {
        self.entries.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Forget every resolved element, keeping the targets
    pub fn invalidate_all(&mut self) {
        for entry in self.entries.values_mut() {
            if let CacheEntry::Resolved { target, .. } = entry {
                *entry = CacheEntry::Unresolved(std::mem::take(target));
            }
        }
    }

    /// Elements for `name` at page generation `generation`.
    ///
    /// Names that aren't in the cache are looked up as targets themselves and never stored.
    /// An empty lookup leaves the entry unresolved so the next call tries again.
    pub fn resolve<F>(&mut self, name: &str, generation: u64, lookup: F) -> Result<Vec<E>>
    where
        F: FnOnce(&str) -> Result<Vec<E>>,
    {
        self.resolve_live(name, generation, |_| Ok(true), lookup)
    }

    /// Like [`ElementCache::resolve`], also looking the name up again when any cached element
    /// fails `is_live` (removed from the document without a navigation)
    pub fn resolve_live<L, F>(&mut self, name: &str, generation: u64, is_live: L, lookup: F) -> Result<Vec<E>>
    where
        L: Fn(&E) -> Result<bool>,
        F: FnOnce(&str) -> Result<Vec<E>>,
    {
        let Some(entry) = self.entries.get_mut(name) else {
            return lookup(name);
        };

        let target = match entry {
            CacheEntry::Resolved { target, elements, generation: resolved_at } if *resolved_at == generation => {
                let mut live = true;
                for element in elements.iter() {
                    if !is_live(element)? {
                        live = false;
                        break;
                    }
                }
                if live {
                    return Ok(elements.clone());
                }
                debug!("Cached elements for '{}' were detached, resolving again", name);
                target.clone()
            }
            CacheEntry::Resolved { target, .. } => {
                debug!("Cached elements for '{}' are stale, resolving again", name);
                target.clone()
            }
            CacheEntry::Unresolved(target) => target.clone(),
        };

        let elements = lookup(&target)?;
        *entry = if elements.is_empty() {
            CacheEntry::Unresolved(target)
        } else {
            CacheEntry::Resolved { target, elements: elements.clone(), generation }
        };
        Ok(elements)
    }

    /// All elements for a name or literal target
    pub fn find_elements<P>(&mut self, page: &P, options: &ResolverOptions, name: &str) -> Result<Vec<E>>
    where
        P: Page<Element = E>,
    {
        if name.is_empty() {
            return Ok(Vec::new());
        }
        self.resolve_live(
            name,
            page.generation(),
            |element| page.is_attached(element),
            |target| resolve_target(page, &Target::parse(target), options, false),
        )
    }

    /// The first element for a name or literal target.
    ///
    /// The full match list is what gets cached, so a later [`ElementCache::find_elements`] on the
    /// same name still sees every element. The first match in document order is the element a
    /// forced single lookup would pick.
    pub fn find_element<P>(&mut self, page: &P, options: &ResolverOptions, name: &str) -> Result<Option<E>>
    where
        P: Page<Element = E>,
    {
        Ok(self.find_elements(page, options, name)?.into_iter().next())
    }
}

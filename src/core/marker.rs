//! Markers: named tags attached to individual log calls
//!
//! A marker may aggregate other markers. Filtering always uses containment,
//! so a rule requiring `AUDIT` matches an event tagged with `SECURITY_AUDIT`
//! when `SECURITY_AUDIT` references `AUDIT`.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable, cheaply clonable marker
///
/// # Example
///
/// ```
/// use rust_logevents::Marker;
///
/// let audit = Marker::new("AUDIT");
/// let login = Marker::with_references("LOGIN", [audit.clone()]);
///
/// assert!(login.contains(&audit));
/// assert!(!audit.contains(&login));
/// ```
#[derive(Clone)]
pub struct Marker {
    inner: Arc<MarkerInner>,
}

struct MarkerInner {
    name: String,
    references: Vec<Marker>,
}

/// Ordered set of markers, keyed by name
pub type MarkerSet = BTreeSet<Marker>;

impl Marker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_references(name, [])
    }

    /// Create a marker that aggregates `references`
    pub fn with_references(name: impl Into<String>, references: impl IntoIterator<Item = Marker>) -> Self {
        Self {
            inner: Arc::new(MarkerInner {
                name: name.into(),
                references: references.into_iter().collect(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn references(&self) -> &[Marker] {
        &self.inner.references
    }

    /// Reflexive, transitive containment
    pub fn contains(&self, other: &Marker) -> bool {
        self.contains_name(other.name())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name() == name || self.references().iter().any(|r| r.contains_name(name))
    }

    /// This marker followed by every marker it transitively references
    pub fn flatten(&self) -> Vec<Marker> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<Marker>) {
        if out.iter().any(|m| m == self) {
            return;
        }
        out.push(self.clone());
        for reference in self.references() {
            reference.collect_into(out);
        }
    }
}

impl PartialEq for Marker {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Marker {}

impl Hash for Marker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl PartialOrd for Marker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Marker {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.references().is_empty() {
            write!(f, "Marker({})", self.name())
        } else {
            f.debug_struct("Marker")
                .field("name", &self.name())
                .field("references", &self.references())
                .finish()
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Marker {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

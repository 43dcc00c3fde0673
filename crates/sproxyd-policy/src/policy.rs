//! Storage policies and the rings serving them

use sproxyd_common::PolicyIndex;
use std::fmt;
use std::sync::Arc;

/// Ordered list of endpoint URLs serving one group of rings
pub type EndpointGroup = Vec<String>;

/// What a caller intends to do with the endpoints it looks up
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    Read,
    Write,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// A named sproxyd deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ring {
    name: String,
    location: Option<String>,
    endpoints: Vec<String>,
}

impl Ring {
    pub(crate) const fn new(name: String, location: Option<String>, endpoints: Vec<String>) -> Self {
        Self {
            name,
            location,
            endpoints,
        }
    }

    /// Ring name as written in the policy document
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location (datacenter) the ring lives in, if any
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Endpoint URLs in configured order
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

/// A storage policy: which rings to read from and which to write to
#[derive(Clone, Debug)]
pub struct Policy {
    index: PolicyIndex,
    read_set: Vec<Arc<Ring>>,
    write_set: Vec<Arc<Ring>>,
}

impl Policy {
    pub(crate) const fn new(
        index: PolicyIndex,
        read_set: Vec<Arc<Ring>>,
        write_set: Vec<Arc<Ring>>,
    ) -> Self {
        Self {
            index,
            read_set,
            write_set,
        }
    }

    #[must_use]
    pub const fn index(&self) -> PolicyIndex {
        self.index
    }

    /// Rings used for the given intent, in configured order
    #[must_use]
    pub fn rings(&self, intent: Intent) -> &[Arc<Ring>] {
        match intent {
            Intent::Read => &self.read_set,
            Intent::Write => &self.write_set,
        }
    }

    /// Endpoint groups relevant to `intent`, ordered by location preference
    ///
    /// Without hints every ring lands in one group. With hints, each hint
    /// yields the group of rings at that location (empty groups are
    /// skipped), followed by a last group holding the rings no hint matched.
    /// Every ring appears exactly once and ring order within a group follows
    /// the policy document.
    #[must_use]
    pub fn lookup<S: AsRef<str>>(&self, intent: Intent, location_hints: &[S]) -> Vec<EndpointGroup> {
        let rings = self.rings(intent);
        let mut taken = vec![false; rings.len()];
        let mut groups = Vec::with_capacity(location_hints.len() + 1);

        for hint in location_hints {
            let hint = hint.as_ref();
            let mut group = EndpointGroup::new();
            for (ring, taken) in rings.iter().zip(taken.iter_mut()) {
                if !*taken && ring.location() == Some(hint) {
                    *taken = true;
                    group.extend(ring.endpoints().iter().cloned());
                }
            }
            if !group.is_empty() {
                groups.push(group);
            }
        }

        let rest: EndpointGroup = rings
            .iter()
            .zip(&taken)
            .filter(|(_, taken)| !**taken)
            .flat_map(|(ring, _)| ring.endpoints().iter().cloned())
            .collect();
        if !rest.is_empty() {
            groups.push(rest);
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(name: &str, location: &str, endpoints: &[&str]) -> Arc<Ring> {
        Arc::new(Ring::new(
            name.to_string(),
            Some(location.to_string()),
            endpoints.iter().map(ToString::to_string).collect(),
        ))
    }

    fn policy() -> Policy {
        let paris = ring("paris", "paris", &["http://p1/", "http://p2/"]);
        let london = ring("london", "london", &["http://l1/"]);
        let sf = ring("sf", "sf", &["http://s1/"]);
        Policy::new(
            PolicyIndex::new(1),
            vec![paris.clone(), london.clone(), sf],
            vec![london, paris],
        )
    }

    #[test]
    fn test_lookup_without_hints_keeps_order() {
        let groups = policy().lookup::<&str>(Intent::Write, &[]);
        assert_eq!(groups, vec![vec!["http://l1/", "http://p1/", "http://p2/"]]);
    }

    #[test]
    fn test_lookup_with_hints() {
        let groups = policy().lookup(Intent::Read, &["sf", "paris"]);
        assert_eq!(
            groups,
            vec![
                vec!["http://s1/".to_string()],
                vec!["http://p1/".to_string(), "http://p2/".to_string()],
                vec!["http://l1/".to_string()],
            ]
        );
    }

    #[test]
    fn test_lookup_unknown_hint_is_skipped() {
        let groups = policy().lookup(Intent::Write, &["tokyo"]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn test_lookup_all_matched_has_no_rest_group() {
        let groups = policy().lookup(Intent::Write, &["paris", "london"]);
        assert_eq!(
            groups,
            vec![
                vec!["http://p1/".to_string(), "http://p2/".to_string()],
                vec!["http://l1/".to_string()],
            ]
        );
    }
}

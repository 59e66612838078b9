//! Structured element selectors.
//!
//! Selectors are the CSS-selector equivalent for the in-process element
//! tree: a chain of steps where each step constrains the tag and attributes
//! of one ancestor level, joined by the direct-child combinator. They are
//! built programmatically rather than parsed from selector strings.

use std::fmt;

/// How an attribute predicate compares against an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMatch {
    /// The attribute value equals the expected value.
    Equals,
    /// The attribute value contains the expected value as a substring.
    Contains,
    /// The attribute value starts with the expected value.
    StartsWith,
}

/// A single attribute constraint on one selector step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrPredicate {
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) op: AttrMatch,
}

impl AttrPredicate {
    /// Check this predicate against an attribute value, if present.
    pub(crate) fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else { return false };
        match self.op {
            AttrMatch::Equals => actual == self.value,
            AttrMatch::Contains => actual.contains(&self.value),
            AttrMatch::StartsWith => actual.starts_with(&self.value),
        }
    }
}

/// One level of a selector chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) tag: Option<String>,
    pub(crate) attrs: Vec<AttrPredicate>,
}

impl Step {
    /// Check the tag and attribute constraints of this step.
    pub(crate) fn matches(&self, tag: &str, attr: impl Fn(&str) -> Option<String>) -> bool {
        if let Some(expected) = &self.tag {
            if expected != tag {
                return false;
            }
        }
        self.attrs.iter().all(|p| p.matches(attr(&p.name).as_deref()))
    }
}

/// A structured element selector.
///
/// The chain is ordered ancestor-first; an element matches when it satisfies
/// the final step and each preceding step matches the successive direct
/// parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub(crate) chain: Vec<Step>,
}

impl Selector {
    /// A selector matching any element.
    #[must_use]
    pub fn any() -> Self {
        Self {
            chain: vec![Step::default()],
        }
    }

    /// A selector matching elements with the given tag.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            chain: vec![Step {
                tag: Some(tag.into()),
                attrs: Vec::new(),
            }],
        }
    }

    /// Require an attribute to equal a value on the last step.
    #[must_use]
    pub fn attr(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_attr(name, value, AttrMatch::Equals)
    }

    /// Require an attribute to contain a value on the last step.
    #[must_use]
    pub fn attr_contains(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_attr(name, value, AttrMatch::Contains)
    }

    /// Require an attribute to start with a value on the last step.
    #[must_use]
    pub fn attr_starts_with(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_attr(name, value, AttrMatch::StartsWith)
    }

    /// Extend this selector with a direct-child step.
    #[must_use]
    pub fn child(mut self, next: Self) -> Self {
        self.chain.extend(next.chain);
        self
    }

    fn push_attr(mut self, name: impl Into<String>, value: impl Into<String>, op: AttrMatch) -> Self {
        if let Some(step) = self.chain.last_mut() {
            step.attrs.push(AttrPredicate {
                name: name.into(),
                value: value.into(),
                op,
            });
        }
        self
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            match &step.tag {
                Some(tag) => write!(f, "{tag}")?,
                None if step.attrs.is_empty() => write!(f, "*")?,
                None => {}
            }
            for p in &step.attrs {
                let op = match p.op {
                    AttrMatch::Equals => "=",
                    AttrMatch::Contains => "*=",
                    AttrMatch::StartsWith => "^=",
                };
                write!(f, "[{}{}'{}']", p.name, op, p.value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_predicate_equals() {
        let p = AttrPredicate {
            name: "data-testid".to_string(),
            value: "post-text".to_string(),
            op: AttrMatch::Equals,
        };
        assert!(p.matches(Some("post-text")));
        assert!(!p.matches(Some("post-text-extra")));
        assert!(!p.matches(None));
    }

    #[test]
    fn test_attr_predicate_contains() {
        let p = AttrPredicate {
            name: "aria-label".to_string(),
            value: "Home Timeline".to_string(),
            op: AttrMatch::Contains,
        };
        assert!(p.matches(Some("Timeline: Home Timeline")));
        assert!(!p.matches(Some("Notifications")));
    }

    #[test]
    fn test_attr_predicate_starts_with() {
        let p = AttrPredicate {
            name: "style".to_string(),
            value: "position: relative".to_string(),
            op: AttrMatch::StartsWith,
        };
        assert!(p.matches(Some("position: relative; top: 0")));
        assert!(!p.matches(Some("top: 0; position: relative")));
    }

    #[test]
    fn test_step_tag_and_attr() {
        let sel = Selector::tag("div").attr("role", "article");
        let step = &sel.chain[0];
        assert!(step.matches("div", |name| {
            (name == "role").then(|| "article".to_string())
        }));
        assert!(!step.matches("span", |name| {
            (name == "role").then(|| "article".to_string())
        }));
        assert!(!step.matches("div", |_| None));
    }

    #[test]
    fn test_child_extends_chain() {
        let sel = Selector::any()
            .attr_contains("aria-label", "Home Timeline")
            .child(Selector::tag("div").attr_starts_with("style", "position: relative"));
        assert_eq!(sel.chain.len(), 2);
    }

    #[test]
    fn test_display() {
        let sel = Selector::any()
            .attr_contains("aria-label", "Home Timeline")
            .child(Selector::tag("div").attr_starts_with("style", "position: relative"));
        assert_eq!(
            sel.to_string(),
            "[aria-label*='Home Timeline'] > div[style^='position: relative']"
        );
        assert_eq!(Selector::any().to_string(), "*");
    }
}

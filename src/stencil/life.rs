//! Life-like birth/survival rules over a Moore neighborhood.

use std::fmt;

use super::cell::Cell;
use super::error::{Error, Result};
use super::hood::Stencil;
use super::rule::Rule;
use super::state::GridKey;

/// Outer-totalistic rule: the next state depends on whether the cell is
/// alive and how many of its Moore neighbors are.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifeRule {
    radius: usize,
    birth: Vec<usize>,
    survive: Vec<usize>,
    /// Indexed by `count << 1 | alive`.
    table: Box<[bool]>,
}

impl LifeRule {
    /// Radius-1 rule from birth and survival neighbor counts.
    pub fn new<B, S>(birth: B, survive: S) -> Self
    where
        B: IntoIterator<Item = usize>,
        S: IntoIterator<Item = usize>,
    {
        let mut birth: Vec<usize> = birth.into_iter().collect();
        let mut survive: Vec<usize> = survive.into_iter().collect();
        birth.sort_unstable();
        birth.dedup();
        survive.sort_unstable();
        survive.dedup();
        let table = build_table(1, &birth, &survive);
        Self {
            radius: 1,
            birth,
            survive,
            table,
        }
    }

    /// B3/S23.
    pub fn conway() -> Self {
        Self::new([3], [2, 3])
    }

    /// Parse a `B.../S...` rulestring, e.g. `B36/S23`. Case-insensitive.
    pub fn parse(rule: &str) -> Result<Self> {
        let invalid = || Error::InvalidRuleString(rule.to_string());
        let (birth, survive) = rule.trim().split_once('/').ok_or_else(invalid)?;
        let digits = |part: &str, prefix: char| -> Result<Vec<usize>> {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) if c.eq_ignore_ascii_case(&prefix) => {}
                _ => return Err(invalid()),
            }
            chars
                .map(|c| c.to_digit(10).map(|d| d as usize).ok_or_else(invalid))
                .collect()
        };
        let rule = Self::new(digits(birth, 'B')?, digits(survive, 'S')?);
        if rule.birth.iter().chain(&rule.survive).any(|&n| n > 8) {
            return Err(invalid());
        }
        Ok(rule)
    }

    /// Same counts over a wider Moore neighborhood.
    pub fn with_radius(mut self, radius: usize) -> Self {
        let radius = radius.max(1);
        self.table = build_table(radius, &self.birth, &self.survive);
        self.radius = radius;
        self
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn birth(&self) -> &[usize] {
        &self.birth
    }

    pub fn survive(&self) -> &[usize] {
        &self.survive
    }

    /// A dead cell with no live neighbors stays dead. The engine falls back
    /// to visiting every block for rules without this property.
    pub fn is_quiescent(&self) -> bool {
        !self.birth.contains(&0)
    }

    #[inline(always)]
    pub fn next(&self, alive: bool, count: usize) -> bool {
        self.table
            .get(count << 1 | alive as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Neighborhood rule on `key` reading and writing the same grid.
    pub fn into_rule<T>(self, key: impl Into<GridKey>) -> Rule<T>
    where
        T: Cell + From<bool>,
    {
        let stencil = Stencil::moore(self.radius);
        let counted = stencil.clone();
        Rule::neighborhood(key, stencil, move |_, state: T, hood| {
            T::from(self.next(state.is_active(), hood.count_active(&counted)))
        })
    }
}

fn build_table(radius: usize, birth: &[usize], survive: &[usize]) -> Box<[bool]> {
    let side = 2 * radius + 1;
    let max_count = side * side - 1;
    (0..=max_count)
        .flat_map(|count| [birth.contains(&count), survive.contains(&count)])
        .collect()
}

impl fmt::Display for LifeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("B")?;
        for n in &self.birth {
            write!(f, "{n}")?;
        }
        f.write_str("/S")?;
        for n in &self.survive {
            write!(f, "{n}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::LifeRule;
    use crate::stencil::error::Error;

    #[test]
    fn conway_table_matches_reference() {
        let rule = LifeRule::conway();
        for count in 0..=8 {
            assert_eq!(rule.next(false, count), count == 3, "dead with {count}");
            assert_eq!(rule.next(true, count), count == 2 || count == 3, "alive with {count}");
        }
        assert!(!rule.next(true, 99));
    }

    #[test]
    fn parse_accepts_rulestrings() {
        let highlife = LifeRule::parse("B36/S23").unwrap();
        assert_eq!(highlife.birth(), &[3, 6]);
        assert_eq!(highlife.survive(), &[2, 3]);
        assert_eq!(highlife.to_string(), "B36/S23");
        assert_eq!(LifeRule::parse("b3/s23").unwrap(), LifeRule::conway());
        assert_eq!(LifeRule::parse("B/S").unwrap().to_string(), "B/S");
    }

    #[test]
    fn parse_rejects_malformed_rulestrings() {
        for bad in ["", "B3S23", "3/23", "B3/X23", "B3a/S23", "B9/S23"] {
            assert_eq!(
                LifeRule::parse(bad),
                Err(Error::InvalidRuleString(bad.to_string())),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn wider_radius_extends_counts() {
        let rule = LifeRule::new([10], [9, 10]).with_radius(2);
        assert_eq!(rule.radius(), 2);
        assert!(rule.next(false, 10));
        assert!(rule.next(true, 9));
        assert!(!rule.next(false, 24));
        assert!(rule.is_quiescent());
        assert!(!LifeRule::new([0], []).is_quiescent());
    }
}

//! Timestep keys: a base name plus a non-negative index.
//!
//! Keys render as `base_name + index` (e.g. `t_0`, `t_1`) for persistence
//! and display, but are stored as a typed pair so that the simulation never
//! parses strings on the hot path. Ordering is by base name, then index.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StructureError;

/// Default base name for simulation timestep keys.
pub const DEFAULT_BASE_NAME: &str = "t_";

/// A typed timestep key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeKey {
    base_name: String,
    index: u64,
}

impl TimeKey {
    /// Create a key from a base name and an index.
    pub fn new(base_name: impl Into<String>, index: u64) -> Self {
        Self {
            base_name: base_name.into(),
            index,
        }
    }

    /// Create a key under [`DEFAULT_BASE_NAME`].
    pub fn at(index: u64) -> Self {
        Self::new(DEFAULT_BASE_NAME, index)
    }

    /// Return the base name.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Return the index.
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Return the key one step later under the same base name.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::ArithmeticOverflow`] at `u64::MAX`.
    pub fn next(&self) -> Result<Self, StructureError> {
        let index = self
            .index
            .checked_add(1)
            .ok_or(StructureError::ArithmeticOverflow)?;
        Ok(self.with_index(index))
    }

    /// Return a key with the same base name and a different index.
    pub fn with_index(&self, index: u64) -> Self {
        Self {
            base_name: self.base_name.clone(),
            index,
        }
    }

    /// Whether this key belongs to the series named `base_name`.
    pub fn is_in_series(&self, base_name: &str) -> bool {
        self.base_name == base_name
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base_name, self.index)
    }
}

impl FromStr for TimeKey {
    type Err = StructureError;

    /// Split a rendered key into its base name and trailing decimal index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(pos, _)| pos)
            .ok_or_else(|| StructureError::InvalidTimeKey(s.to_owned()))?;
        let (base, digits) = s.split_at(split);
        let index = digits
            .parse::<u64>()
            .map_err(|_err| StructureError::InvalidTimeKey(s.to_owned()))?;
        Ok(Self::new(base, index))
    }
}

/// The naming scheme for a structure's timestep keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyName {
    /// Prefix of every key in the series.
    pub base_name: String,
    /// Index the series starts at.
    pub index: u64,
}

impl KeyName {
    /// Return the first key of the series.
    pub fn initial_key(&self) -> TimeKey {
        TimeKey::new(self.base_name.clone(), self.index)
    }
}

impl Default for KeyName {
    fn default() -> Self {
        Self {
            base_name: DEFAULT_BASE_NAME.to_owned(),
            index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_base_and_index() {
        assert_eq!(TimeKey::at(12).to_string(), "t_12");
        assert_eq!(TimeKey::new("run", 3).to_string(), "run3");
    }

    #[test]
    fn parses_rendered_keys() {
        let key: Result<TimeKey, _> = "t_42".parse();
        assert_eq!(key, Ok(TimeKey::at(42)));
        let key: Result<TimeKey, _> = "step7".parse();
        assert_eq!(key, Ok(TimeKey::new("step", 7)));
    }

    #[test]
    fn rejects_keys_without_index() {
        let key: Result<TimeKey, _> = "t_".parse();
        assert!(matches!(key, Err(StructureError::InvalidTimeKey(_))));
    }

    #[test]
    fn next_keeps_base_name() {
        let next = TimeKey::new("x", 4).next();
        assert_eq!(next, Ok(TimeKey::new("x", 5)));
        assert!(TimeKey::at(u64::MAX).next().is_err());
    }

    #[test]
    fn orders_by_base_then_index() {
        assert!(TimeKey::at(2) < TimeKey::at(10));
        assert!(TimeKey::new("a", 9) < TimeKey::new("b", 0));
    }
}

use std::cmp::Ordering;
use std::fmt;
use std::ops::Neg;

use super::pool::PackageId;

/// Whether a literal asks for its package to be installed or kept out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Positive,
    Negative,
}

/// A package id with a polarity; the atom of every rule
///
/// Displays and orders as the signed integer `+id` / `-id`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    id: PackageId,
    polarity: Polarity,
}

impl Literal {
    pub fn new(id: PackageId, polarity: Polarity) -> Self {
        debug_assert!(id > 0, "package ids start at 1");
        Self { id, polarity }
    }

    /// "install package `id`"
    pub fn positive(id: PackageId) -> Self {
        Self::new(id, Polarity::Positive)
    }

    /// "do not install package `id`"
    pub fn negative(id: PackageId) -> Self {
        Self::new(id, Polarity::Negative)
    }

    /// Inverse of [`Literal::to_signed`]; `None` for zero.
    pub fn from_signed(value: i64) -> Option<Self> {
        let id = PackageId::try_from(value.unsigned_abs()).ok()?;
        match value.cmp(&0) {
            Ordering::Greater => Some(Self::positive(id)),
            Ordering::Less => Some(Self::negative(id)),
            Ordering::Equal => None,
        }
    }

    pub fn to_signed(self) -> i64 {
        match self.polarity {
            Polarity::Positive => i64::from(self.id),
            Polarity::Negative => -i64::from(self.id),
        }
    }

    pub fn id(self) -> PackageId {
        self.id
    }

    pub fn polarity(self) -> Polarity {
        self.polarity
    }

    pub fn is_positive(self) -> bool {
        self.polarity == Polarity::Positive
    }

    pub fn is_negative(self) -> bool {
        self.polarity == Polarity::Negative
    }
}

impl Neg for Literal {
    type Output = Literal;

    fn neg(self) -> Literal {
        let polarity = match self.polarity {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        };
        Literal::new(self.id, polarity)
    }
}

impl Ord for Literal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_signed().cmp(&other.to_signed())
    }
}

impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_signed())
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_signed())
    }
}

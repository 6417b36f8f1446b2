//! Ordering of normalized version strings

use std::cmp::Ordering;

use crate::constraint::Operator;

/// Rank given to a numeric segment when it is compared against a word
const NUMBER_RANK: i8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Number(u64),
    Word(i8),
}

impl Segment {
    fn rank(self) -> i8 {
        match self {
            Segment::Number(_) => NUMBER_RANK,
            Segment::Word(rank) => rank,
        }
    }
}

/// Rank of a pre-release/patch word. Matching is by prefix, first hit wins.
fn word_rank(word: &str) -> i8 {
    const FORMS: [(&str, i8); 9] = [
        ("dev", 0),
        ("alpha", 1),
        ("a", 1),
        ("beta", 2),
        ("b", 2),
        ("RC", 3),
        ("rc", 3),
        ("pl", 5),
        ("p", 5),
    ];

    FORMS
        .iter()
        .find(|(form, _)| word.starts_with(form))
        .map(|(_, rank)| *rank)
        .unwrap_or(-6)
}

/// Splits a version into runs of digits and runs of letters. Everything else
/// separates segments.
fn segments(version: &str) -> Vec<Segment> {
    let bytes = version.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_alphanumeric() {
            i += 1;
            continue;
        }

        let start = i;
        let digits = bytes[i].is_ascii_digit();
        while i < bytes.len()
            && bytes[i].is_ascii_alphanumeric()
            && bytes[i].is_ascii_digit() == digits
        {
            i += 1;
        }

        let text = &version[start..i];
        out.push(if digits {
            Segment::Number(text.parse().unwrap_or(u64::MAX))
        } else {
            Segment::Word(word_rank(text))
        });
    }

    out
}

fn compare_segment(a: Segment, b: Segment) -> Ordering {
    match (a, b) {
        (Segment::Number(x), Segment::Number(y)) => x.cmp(&y),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Compares two versions the way PHP's `version_compare` does.
///
/// A trailing numeric segment makes a version newer (`1.0.1 > 1.0`), a
/// trailing word is weighed against a number (`1.0-dev < 1.0 < 1.0-patch1`).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);

    for (x, y) in left.iter().zip(right.iter()) {
        let ord = compare_segment(*x, *y);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match left.len().cmp(&right.len()) {
        Ordering::Greater => match left[right.len()] {
            Segment::Number(_) => Ordering::Greater,
            Segment::Word(rank) => rank.cmp(&NUMBER_RANK),
        },
        Ordering::Less => match right[left.len()] {
            Segment::Number(_) => Ordering::Less,
            Segment::Word(rank) => NUMBER_RANK.cmp(&rank),
        },
        Ordering::Equal => Ordering::Equal,
    }
}

/// Operator based comparisons that know about `dev-` branches
pub struct Comparator;

impl Comparator {
    pub fn greater_than(a: &str, b: &str) -> bool {
        Self::compare(a, Operator::GreaterThan, b)
    }

    pub fn less_than(a: &str, b: &str) -> bool {
        Self::compare(a, Operator::LessThan, b)
    }

    pub fn equal_to(a: &str, b: &str) -> bool {
        Self::compare(a, Operator::Equal, b)
    }

    /// Evaluates `a <operator> b`.
    ///
    /// Named branches are only equal to themselves and sort below every
    /// numbered version.
    pub fn compare(a: &str, operator: Operator, b: &str) -> bool {
        let a_branch = a.starts_with("dev-");
        let b_branch = b.starts_with("dev-");

        if a_branch || b_branch {
            return match operator {
                Operator::NotEqual => a != b,
                Operator::Equal => a == b,
                _ if a_branch && b_branch => false,
                Operator::LessThan | Operator::LessThanOrEqual => a_branch,
                Operator::GreaterThan | Operator::GreaterThanOrEqual => b_branch,
            };
        }

        operator.holds(compare_versions(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ordering() {
        assert_eq!(compare_versions("1.0.0.0", "1.0.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10.0.0", "1.9.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("2", "10"), Ordering::Less);
    }

    #[test]
    fn test_pre_release_ordering() {
        assert_eq!(compare_versions("1.0.0.0-dev", "1.0.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0.0-alpha1", "1.0.0.0-beta1"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0.0-beta2", "1.0.0.0-RC1"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0.0-RC1", "1.0.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0.0-patch1", "1.0.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0.0-beta10", "1.0.0.0-beta9"), Ordering::Greater);
    }

    #[test]
    fn test_branches() {
        assert!(Comparator::equal_to("dev-main", "dev-main"));
        assert!(!Comparator::equal_to("dev-main", "dev-feature"));
        assert!(Comparator::greater_than("1.0.0.0", "dev-main"));
        assert!(Comparator::less_than("dev-main", "0.0.1.0"));
        assert!(!Comparator::greater_than("dev-main", "dev-feature"));
    }

    #[test]
    fn test_operator_forms() {
        assert!(Comparator::compare("1.2.0.0", Operator::GreaterThanOrEqual, "1.2.0.0"));
        assert!(Comparator::compare("1.2.0.0", Operator::NotEqual, "1.3.0.0"));
        assert!(!Comparator::compare("1.2.0.0", Operator::LessThan, "1.2.0.0"));
    }
}

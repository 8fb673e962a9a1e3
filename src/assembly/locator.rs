//! Anchor lookup inside a method body.
//!
//! The [`Locator`] performs a single pass over the exact instruction order present
//! at call time, left-to-right or right-to-left, and returns the index of the
//! matching instruction plus a caller-supplied signed offset. There is no fuzzy
//! matching and no fallback: a missing anchor is [`Error::AnchorNotFound`], which the
//! patch catalog treats as fatal for that patch.
//!
//! [`Anchor`] packages a query together with its direction and offset, so a patch
//! descriptor can carry it as plain data and resolve it against whatever body the
//! method table hands back at load time.
//!
//! # Examples
//!
//! ```rust
//! use ilweave::assembly::{Anchor, CodeMatch, Direction, Instruction, Locator, MethodBody, MethodRef, TypeSig};
//!
//! let mut body = MethodBody::new(MethodRef::static_method("Host", "Tick", vec![TypeSig::I32], TypeSig::Void));
//! body.extend([Instruction::ldarg(0), Instruction::pop(), Instruction::ret()]);
//!
//! let locator = Locator::new(&body);
//! assert_eq!(locator.find(&CodeMatch::LoadsArg(0), Direction::Forward, 1)?, 1);
//! assert_eq!(Anchor::last(CodeMatch::Return).resolve(&body)?, 2);
//! # Ok::<(), ilweave::Error>(())
//! ```

use crate::{
    assembly::{
        body::MethodBody,
        matcher::{CodeMatch, InstructionMatcher},
    },
    Error, Result,
};

/// Scan direction of a locator query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// First match, scanning from the start
    Forward,
    /// Last match, scanning from the end
    Backward,
}

/// Read-only anchor search over one body.
pub struct Locator<'a> {
    body: &'a MethodBody,
}

impl<'a> Locator<'a> {
    /// Creates a locator over `body`.
    #[must_use]
    pub fn new(body: &'a MethodBody) -> Self {
        Self { body }
    }

    /// Index of the first (or last) match, plus `offset`.
    ///
    /// # Errors
    ///
    /// [`Error::AnchorNotFound`] if nothing matches, [`Error::OutOfBounds`] if the offset
    /// leaves `0..=len`.
    pub fn find<M>(&self, matcher: &M, direction: Direction, offset: isize) -> Result<usize>
    where
        M: InstructionMatcher + ?Sized,
    {
        self.find_nth(matcher, direction, 0, offset)
    }

    /// Index of the `n`-th match (0-based) in scan order, plus `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`Locator::find`].
    pub fn find_nth<M>(
        &self,
        matcher: &M,
        direction: Direction,
        n: usize,
        offset: isize,
    ) -> Result<usize>
    where
        M: InstructionMatcher + ?Sized,
    {
        let instructions = self.body.instructions();
        let found = match direction {
            Direction::Forward => instructions
                .iter()
                .enumerate()
                .filter(|(_, instr)| matcher.matches(instr))
                .nth(n),
            Direction::Backward => instructions
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, instr)| matcher.matches(instr))
                .nth(n),
        };
        match found {
            Some((index, _)) => self.apply_offset(index, offset),
            None => Err(self.not_found(matcher.description())),
        }
    }

    /// Every matching index, in ascending order.
    #[must_use]
    pub fn find_all<M>(&self, matcher: &M) -> Vec<usize>
    where
        M: InstructionMatcher + ?Sized,
    {
        self.body
            .instructions()
            .iter()
            .enumerate()
            .filter(|(_, instr)| matcher.matches(instr))
            .map(|(index, _)| index)
            .collect()
    }

    /// Start index of the first (or last) contiguous run where instruction `i` of the run
    /// matches `pattern[i]`, plus `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`Locator::find`]. An empty pattern matches nothing.
    pub fn find_sequence(
        &self,
        pattern: &[CodeMatch],
        direction: Direction,
        offset: isize,
    ) -> Result<usize> {
        let instructions = self.body.instructions();
        let describe = || {
            let parts: Vec<String> = pattern.iter().map(InstructionMatcher::description).collect();
            format!("[{}]", parts.join(", "))
        };
        if pattern.is_empty() || pattern.len() > instructions.len() {
            return Err(self.not_found(describe()));
        }

        let starts = 0..=instructions.len() - pattern.len();
        let is_match = |start: &usize| {
            pattern
                .iter()
                .zip(&instructions[*start..])
                .all(|(m, instr)| m.matches(instr))
        };
        let found = match direction {
            Direction::Forward => starts.into_iter().find(is_match),
            Direction::Backward => starts.into_iter().rev().find(is_match),
        };
        match found {
            Some(index) => self.apply_offset(index, offset),
            None => Err(self.not_found(describe())),
        }
    }

    fn apply_offset(&self, index: usize, offset: isize) -> Result<usize> {
        let len = self.body.len();
        let target = isize::try_from(index)
            .ok()
            .and_then(|index| index.checked_add(offset));
        match target {
            Some(target) if target >= 0 && target.unsigned_abs() <= len => {
                Ok(target.unsigned_abs())
            }
            _ => Err(Error::OutOfBounds {
                index: target.unwrap_or(isize::MAX),
                len,
            }),
        }
    }

    fn not_found(&self, query: String) -> Error {
        Error::AnchorNotFound {
            method: self.body.id().to_string(),
            query,
        }
    }
}

#[derive(Debug, Clone)]
enum AnchorQuery {
    Start,
    End,
    Match {
        matcher: CodeMatch,
        direction: Direction,
        nth: usize,
    },
    Sequence {
        pattern: Vec<CodeMatch>,
        direction: Direction,
    },
}

/// A structural splice position: a query plus a signed offset.
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::{Anchor, CodeMatch, FieldRef, TypeSig};
///
/// // "right after the store to Player::Health"
/// let field = FieldRef::instance("Player", "Health", TypeSig::F64);
/// let anchor = Anchor::first(CodeMatch::StoresField(field)).offset(1);
/// assert_eq!(anchor.to_string(), "first stfld float64 Player::Health +1");
/// ```
#[derive(Debug, Clone)]
pub struct Anchor {
    query: AnchorQuery,
    offset: isize,
}

impl Anchor {
    /// Position 0: the method prologue.
    #[must_use]
    pub fn start() -> Self {
        Self {
            query: AnchorQuery::Start,
            offset: 0,
        }
    }

    /// Position `len`: after the last instruction.
    #[must_use]
    pub fn end() -> Self {
        Self {
            query: AnchorQuery::End,
            offset: 0,
        }
    }

    /// First instruction matching `matcher`.
    #[must_use]
    pub fn first(matcher: CodeMatch) -> Self {
        Self::nth(matcher, Direction::Forward, 0)
    }

    /// Last instruction matching `matcher`.
    #[must_use]
    pub fn last(matcher: CodeMatch) -> Self {
        Self::nth(matcher, Direction::Backward, 0)
    }

    /// `nth` match (0-based) in the given scan direction.
    #[must_use]
    pub fn nth(matcher: CodeMatch, direction: Direction, nth: usize) -> Self {
        Self {
            query: AnchorQuery::Match {
                matcher,
                direction,
                nth,
            },
            offset: 0,
        }
    }

    /// Start of a contiguous instruction run.
    #[must_use]
    pub fn sequence(pattern: Vec<CodeMatch>, direction: Direction) -> Self {
        Self {
            query: AnchorQuery::Sequence { pattern, direction },
            offset: 0,
        }
    }

    /// Adds a signed offset to the resolved index.
    #[must_use]
    pub fn offset(mut self, offset: isize) -> Self {
        self.offset = offset;
        self
    }

    /// Resolves this anchor against `body`.
    ///
    /// # Errors
    ///
    /// [`Error::AnchorNotFound`] or [`Error::OutOfBounds`], see [`Locator`].
    pub fn resolve(&self, body: &MethodBody) -> Result<usize> {
        let locator = Locator::new(body);
        match &self.query {
            AnchorQuery::Start => locator.apply_offset(0, self.offset),
            AnchorQuery::End => locator.apply_offset(body.len(), self.offset),
            AnchorQuery::Match {
                matcher,
                direction,
                nth,
            } => locator.find_nth(matcher, *direction, *nth, self.offset),
            AnchorQuery::Sequence { pattern, direction } => {
                locator.find_sequence(pattern, *direction, self.offset)
            }
        }
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.query {
            AnchorQuery::Start => f.write_str("start")?,
            AnchorQuery::End => f.write_str("end")?,
            AnchorQuery::Match {
                matcher,
                direction,
                nth,
            } => {
                let which = match (direction, nth) {
                    (Direction::Forward, 0) => "first".to_string(),
                    (Direction::Backward, 0) => "last".to_string(),
                    (Direction::Forward, n) => format!("match #{n} of"),
                    (Direction::Backward, n) => format!("match #{n} from end of"),
                };
                write!(f, "{which} {matcher}")?;
            }
            AnchorQuery::Sequence { pattern, .. } => {
                let parts: Vec<String> = pattern.iter().map(InstructionMatcher::description).collect();
                write!(f, "sequence [{}]", parts.join(", "))?;
            }
        }
        if self.offset != 0 {
            write!(f, " {:+}", self.offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{
        instruction::Instruction,
        opcodes::OpCode,
        types::{MethodRef, TypeSig},
    };

    fn sample() -> MethodBody {
        let mut body = MethodBody::new(MethodRef::static_method(
            "Host",
            "Sample",
            vec![TypeSig::I32, TypeSig::I32],
            TypeSig::Void,
        ));
        body.extend([
            Instruction::ldarg(0),
            Instruction::pop(),
            Instruction::ldarg(1),
            Instruction::pop(),
            Instruction::ldarg(0),
            Instruction::pop(),
            Instruction::ret(),
        ]);
        body
    }

    #[test]
    fn test_forward_and_backward() {
        let body = sample();
        let locator = Locator::new(&body);
        assert_eq!(locator.find(&CodeMatch::LoadsArg(0), Direction::Forward, 0).unwrap(), 0);
        assert_eq!(locator.find(&CodeMatch::LoadsArg(0), Direction::Backward, 0).unwrap(), 4);
        assert_eq!(locator.find(&CodeMatch::LoadsArg(0), Direction::Backward, -1).unwrap(), 3);
        assert_eq!(
            locator.find_nth(&CodeMatch::Opcode(OpCode::Pop), Direction::Forward, 2, 0).unwrap(),
            5
        );
    }

    #[test]
    fn test_not_found_names_query() {
        let body = sample();
        let err = Locator::new(&body)
            .find(&CodeMatch::StoresArg(3), Direction::Forward, 0)
            .unwrap_err();
        match err {
            Error::AnchorNotFound { method, query } => {
                assert_eq!(method, "Host::Sample(int32, int32)");
                assert_eq!(query, "starg A_3");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_offset_bounds() {
        let body = sample();
        let locator = Locator::new(&body);
        assert_eq!(locator.find(&CodeMatch::Return, Direction::Forward, 1).unwrap(), 7);
        assert!(matches!(
            locator.find(&CodeMatch::Return, Direction::Forward, 2),
            Err(Error::OutOfBounds { index: 8, len: 7 })
        ));
        assert!(matches!(
            locator.find(&CodeMatch::LoadsArg(0), Direction::Forward, -1),
            Err(Error::OutOfBounds { index: -1, .. })
        ));
    }

    #[test]
    fn test_sequence_and_all() {
        let body = sample();
        let locator = Locator::new(&body);
        let pattern = [CodeMatch::LoadsArg(1), CodeMatch::Opcode(OpCode::Pop)];
        assert_eq!(locator.find_sequence(&pattern, Direction::Forward, 0).unwrap(), 2);
        assert_eq!(locator.find_all(&CodeMatch::Opcode(OpCode::Pop)), vec![1, 3, 5]);
        assert!(locator.find_sequence(&[], Direction::Forward, 0).is_err());
    }

    #[test]
    fn test_anchor_resolution() {
        let body = sample();
        assert_eq!(Anchor::start().resolve(&body).unwrap(), 0);
        assert_eq!(Anchor::end().resolve(&body).unwrap(), 7);
        assert_eq!(Anchor::last(CodeMatch::Return).resolve(&body).unwrap(), 6);
        assert_eq!(
            Anchor::first(CodeMatch::LoadsArg(1)).offset(1).resolve(&body).unwrap(),
            3
        );
        assert_eq!(Anchor::last(CodeMatch::Return).offset(-2).to_string(), "last ret -2");
    }
}

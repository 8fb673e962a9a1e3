//! Label-preserving insertion, removal and replacement of instruction ranges.
//!
//! Branches name their targets by [`Label`], so shifting indices never invalidates
//! them. What the splicer must get right is where labels end up when the instructions
//! carrying them move or disappear:
//!
//! - [`insert`] leaves labels where they are, so existing branches into the anchor skip
//!   the new code. [`insert_taking_labels`] moves them onto the first new instruction so
//!   every path into the anchor runs it. [`insert_taking_labels_except`] moves all but
//!   the listed ones.
//! - [`remove`] moves labels of removed instructions onto the instruction that follows
//!   the range. With nothing following, a label some branch still uses is an
//!   [`Error::DanglingLabel`] and an unused one is dropped.
//! - [`replace`] moves labels of the removed range onto the first replacement.
//!
//! Every operation checks its preconditions before touching the body, so an error
//! always leaves the body unchanged. The splicer does not check the terminal
//! instruction; [`MethodBody::validate`] does.

use crate::{
    assembly::{
        body::MethodBody,
        instruction::{Instruction, Label},
    },
    Error, Result,
};

#[allow(clippy::cast_possible_wrap)]
fn check_range(body: &MethodBody, index: usize, count: usize) -> Result<()> {
    match index.checked_add(count) {
        Some(end) if end <= body.len() => Ok(()),
        _ => Err(Error::OutOfBounds {
            index: index.saturating_add(count) as isize,
            len: body.len(),
        }),
    }
}

/// Inserts `instrs` before the instruction at `index` (or appends at `index == len`).
///
/// Labels on the instruction at `index` stay on it.
///
/// # Errors
///
/// [`Error::OutOfBounds`] if `index > len`.
pub fn insert(body: &mut MethodBody, index: usize, instrs: Vec<Instruction>) -> Result<()> {
    check_range(body, index, 0)?;
    body.instructions_mut().splice(index..index, instrs);
    Ok(())
}

/// Inserts `instrs` before `index` and moves the labels of the instruction at `index`
/// onto the first inserted instruction.
///
/// # Errors
///
/// [`Error::OutOfBounds`] if `index > len`.
pub fn insert_taking_labels(
    body: &mut MethodBody,
    index: usize,
    instrs: Vec<Instruction>,
) -> Result<()> {
    insert_taking_labels_except(body, index, instrs, &[])
}

/// Like [`insert_taking_labels`], but labels listed in `keep` stay on the instruction at
/// `index`, so branches to them still skip the inserted code.
///
/// # Errors
///
/// [`Error::OutOfBounds`] if `index > len`.
pub fn insert_taking_labels_except(
    body: &mut MethodBody,
    index: usize,
    mut instrs: Vec<Instruction>,
    keep: &[Label],
) -> Result<()> {
    check_range(body, index, 0)?;
    if let (Some(first), Some(anchor)) = (instrs.first_mut(), body.instructions_mut().get_mut(index)) {
        for label in anchor.take_labels() {
            if keep.contains(&label) {
                anchor.attach_label(label);
            } else {
                first.attach_label(label);
            }
        }
    }
    body.instructions_mut().splice(index..index, instrs);
    Ok(())
}

/// Removes `count` instructions starting at `index` and returns them without labels.
///
/// # Errors
///
/// [`Error::OutOfBounds`] for a range past the end, [`Error::DanglingLabel`] when the range
/// reaches the end of the body and carries a label a surviving branch still targets.
pub fn remove(body: &mut MethodBody, index: usize, count: usize) -> Result<Vec<Instruction>> {
    check_range(body, index, count)?;
    let end = index + count;

    if end == body.len() {
        let survivors = body.instructions()[..index]
            .iter()
            .flat_map(|instr| instr.operand.labels());
        let carried: Vec<Label> = body.instructions()[index..end]
            .iter()
            .flat_map(|instr| instr.labels.iter().copied())
            .collect();
        for label in survivors {
            if carried.contains(&label) {
                return Err(Error::DanglingLabel(label));
            }
        }
    }

    let mut removed: Vec<Instruction> = body.instructions_mut().drain(index..end).collect();
    let labels: Vec<Label> = removed.iter_mut().flat_map(Instruction::take_labels).collect();
    if let Some(next) = body.instructions_mut().get_mut(index) {
        for label in labels {
            next.attach_label(label);
        }
    }
    Ok(removed)
}

/// Replaces `count` instructions starting at `index` with `instrs` and returns the
/// removed instructions without labels.
///
/// Labels on the removed range move to the first replacement. An empty replacement
/// behaves like [`remove`].
///
/// # Errors
///
/// Same as [`remove`].
pub fn replace(
    body: &mut MethodBody,
    index: usize,
    count: usize,
    mut instrs: Vec<Instruction>,
) -> Result<Vec<Instruction>> {
    check_range(body, index, count)?;
    let Some(first) = instrs.first_mut() else {
        return remove(body, index, count);
    };

    for instr in &mut body.instructions_mut()[index..index + count] {
        for label in instr.take_labels() {
            first.attach_label(label);
        }
    }
    Ok(body
        .instructions_mut()
        .splice(index..index + count, instrs)
        .collect())
}

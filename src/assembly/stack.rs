//! Evaluation-stack depth analysis.
//!
//! A single worklist pass over the instruction stream computes the stack depth on
//! entry to every reachable instruction. Depths must agree wherever control flow
//! merges, must never go negative, and a `ret` must leave exactly the return value
//! (or nothing, for void methods) on the stack.
//!
//! The emitters use [`depth_at`] to learn how many values the host left on the stack
//! at an injection point, so an early-return sequence can discard them. The patch
//! catalog runs [`verify`] on every rewritten body before installing it.

use crate::{
    assembly::{
        body::MethodBody,
        instruction::{FlowType, Label},
    },
    Error, Result,
};

/// Computes the entry depth of every instruction. Unreachable instructions get `None`.
///
/// # Errors
///
/// Returns [`Error::StackImbalance`] on underflow, an inconsistent merge, or a `ret` with
/// the wrong number of values, and label errors for dangling or duplicate labels.
pub fn analyze(body: &MethodBody) -> Result<Vec<Option<u16>>> {
    let positions = body.label_positions()?;
    let resolve = |label: Label| -> Result<usize> {
        positions
            .get(&label)
            .copied()
            .ok_or(Error::DanglingLabel(label))
    };

    let returns_value = body.returns().has_value();
    let instructions = body.instructions();
    let mut depths: Vec<Option<u16>> = vec![None; instructions.len()];
    let mut worklist = Vec::new();

    if !instructions.is_empty() {
        depths[0] = Some(0);
        worklist.push(0usize);
    }

    while let Some(index) = worklist.pop() {
        let instr = &instructions[index];
        let depth = depths[index].unwrap_or(0);
        let behavior = instr.stack_behavior(returns_value);

        if depth < behavior.pops {
            return Err(Error::StackImbalance {
                index,
                message: format!(
                    "'{}' pops {} but the stack holds {}",
                    instr, behavior.pops, depth
                ),
            });
        }
        let after = depth - behavior.pops + behavior.pushes;

        if instr.flow_type() == FlowType::Return && after != 0 {
            return Err(Error::StackImbalance {
                index,
                message: format!("{after} value(s) left on the stack at return"),
            });
        }

        let mut successors = Vec::new();
        for label in instr.branch_targets() {
            successors.push(resolve(label)?);
        }
        if !instr.is_terminal() && instr.flow_type() != FlowType::Throw {
            if index + 1 < instructions.len() {
                successors.push(index + 1);
            } else {
                return Err(Error::InvalidTerminal {
                    method: body.id().to_string(),
                });
            }
        }

        for next in successors {
            match depths[next] {
                None => {
                    depths[next] = Some(after);
                    worklist.push(next);
                }
                Some(existing) if existing != after => {
                    return Err(Error::StackImbalance {
                        index: next,
                        message: format!(
                            "stack depth {existing} on one path and {after} on another"
                        ),
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(depths)
}

/// Verifies the whole body and returns the maximum stack depth reached.
///
/// # Errors
///
/// See [`analyze`].
pub fn verify(body: &MethodBody) -> Result<u16> {
    let depths = analyze(body)?;
    let returns_value = body.returns().has_value();
    let mut max = 0;
    for (instr, depth) in body.instructions().iter().zip(&depths) {
        if let Some(depth) = depth {
            let behavior = instr.stack_behavior(returns_value);
            max = max.max(*depth).max(depth - behavior.pops + behavior.pushes);
        }
    }
    Ok(max)
}

/// Stack depth on entry to the instruction at `index`.
///
/// `index == len` asks for the depth after the last instruction, which is only
/// meaningful when that instruction falls through; it is reported as 0 otherwise.
///
/// # Errors
///
/// Returns [`Error::OutOfBounds`] for an index past the end, [`Error::StackImbalance`] if
/// the instruction is unreachable, and any error of [`analyze`].
#[allow(clippy::cast_possible_wrap)]
pub fn depth_at(body: &MethodBody, index: usize) -> Result<u16> {
    if index > body.len() {
        return Err(Error::OutOfBounds {
            index: index as isize,
            len: body.len(),
        });
    }
    let depths = analyze(body)?;
    if index == body.len() {
        return Ok(0);
    }
    depths[index].ok_or_else(|| Error::StackImbalance {
        index,
        message: "instruction is unreachable".to_string(),
    })
}

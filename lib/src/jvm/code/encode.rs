//! Encoding of a [`MethodCode`] back into a `Code` attribute
//!
//! Encoding runs frame inference first: besides producing the stack map frames, it tells which
//! items are reachable. Unreachable instructions are not dropped (labels used by debug attributes
//! or exception ranges might still point at them). Instead, each one shrinks to a single byte and
//! every maximal run of them becomes `nop`s ending in an `athrow`, with a frame whose stack holds a
//! single `Throwable`. Exception ranges are split so they never cover those runs.

use super::jump_encoding::{layout, LayoutElement, SIGNED_16BIT_JUMP_RANGE};
use super::{CodeItem, LocalVariableRange, MethodCode, PoolInstruction, SymInstruction};
use crate::jvm::class_file::{
    BytecodeArray, BytecodeIndex, ClassConstantIndex, Code, ConstantIndex, ConstantPoolOverflow,
    ConstantsPool, ConstantsReader, ConstantsWriter, ExceptionHandler, LineNumber,
    LineNumberTable, LocalVariable, LocalVariableTable, LocalVariableTypeTable, Serialize,
    StackMapTable,
};
use crate::jvm::verifier::{
    infer_frames, CompactFrame, InferredFrames, MethodContext, TypeHierarchy, VFrame, VType,
};
use crate::jvm::{BinaryName, Error};
use crate::util::Width;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

/// Everything needed to encode a method body besides the body itself
pub struct EncodeContext<'a> {
    pub method: MethodContext<'a>,

    /// Used to merge class types when inferring frames
    pub hierarchy: &'a dyn TypeHierarchy,

    /// Should a `StackMapTable` be generated? (class files older than version 50 don't use them)
    pub emit_stack_map: bool,
}

/// Frame to write into the `StackMapTable`
enum FrameAt {
    /// Frame of a reachable item
    Inferred(usize),

    /// Start of a run of unreachable code
    Unreachable,
}

impl MethodCode {
    /// Encode the method body, recomputing the maximum stack and locals along with the frames
    ///
    /// Constants referenced by the instructions are added to `constants` as needed.
    pub fn encode(
        &self,
        context: &EncodeContext<'_>,
        constants: &mut ConstantsPool,
    ) -> Result<Code, Error> {
        let inferred = infer_frames(self, &context.method, context.hierarchy)?;
        let is_live = |item: usize| inferred.is_reachable(item);

        // Resolve operands into the constant pool. Unreachable instructions each take up a single
        // byte, which is enough room for the `nop`s and `athrow` replacing them.
        let lowered = self
            .items
            .iter()
            .enumerate()
            .map(|(item, code_item)| match code_item {
                CodeItem::Instruction(insn) if is_live(item) => {
                    lower_instruction(insn, constants).map(Some)
                }
                _ => Ok(None),
            })
            .collect::<Result<Vec<Option<PoolInstruction>>, ConstantPoolOverflow>>()?;

        let elements: Vec<LayoutElement<'_, _>> = self
            .items
            .iter()
            .enumerate()
            .zip(&lowered)
            .map(|((item, code_item), lowered)| match (code_item, lowered) {
                (CodeItem::Label(label), _) => LayoutElement::Label(*label),
                (CodeItem::Branch(branch), _) if is_live(item) => LayoutElement::Branch(branch),
                (_, Some(insn)) => LayoutElement::Fixed(insn.width()),
                (CodeItem::LineNumber(_), None) => LayoutElement::Fixed(0),
                (_, None) => LayoutElement::Fixed(1),
            })
            .collect();
        let layout = layout(&elements, is_live, &SIGNED_16BIT_JUMP_RANGE)?;
        if layout.code_length > u16::MAX as usize {
            return Err(Error::MethodCodeOverflow(layout.code_length));
        }
        let offset_of = |label: &super::SynLabel| -> Result<usize, Error> {
            layout
                .label_offsets
                .get(label)
                .copied()
                .ok_or_else(|| Error::Malformed(format!("undefined label {:?}", label)))
        };

        // Item of the first instruction at each offset
        let mut instruction_at: BTreeMap<usize, usize> = BTreeMap::new();
        for (item, code_item) in self.items.iter().enumerate() {
            if matches!(code_item, CodeItem::Instruction(_) | CodeItem::Branch(_)) {
                instruction_at.entry(layout.offsets[item]).or_insert(item);
            }
        }

        // Runs of unreachable instructions, as byte ranges
        let mut dead_runs: Vec<(usize, usize)> = vec![];
        for (item, code_item) in self.items.iter().enumerate() {
            let is_instruction = matches!(code_item, CodeItem::Instruction(_) | CodeItem::Branch(_));
            if !is_instruction || is_live(item) {
                continue;
            }
            let start = layout.offsets[item];
            let end = layout
                .offsets
                .get(item + 1)
                .copied()
                .unwrap_or(layout.code_length);
            match dead_runs.last_mut() {
                Some((_, run_end)) if *run_end == start => *run_end = end,
                _ => dead_runs.push((start, end)),
            }
        }
        if !dead_runs.is_empty() {
            log::debug!(
                "Neutralizing {} run(s) of unreachable code in {}",
                dead_runs.len(),
                context.method.name
            );
        }

        // Where frames are needed
        let mut frames_at: BTreeMap<usize, FrameAt> = BTreeMap::new();
        let frame_for_offset = |offset: usize, frames_at: &mut BTreeMap<usize, FrameAt>| {
            if let Some(item) = instruction_at.get(&offset) {
                frames_at.insert(offset, FrameAt::Inferred(*item));
            }
        };
        for (item, code_item) in self.items.iter().enumerate() {
            if let CodeItem::Branch(branch) = code_item {
                if !is_live(item) {
                    continue;
                }
                for target in branch.jump_targets() {
                    frame_for_offset(offset_of(target)?, &mut frames_at);
                }
                if layout.widened[item] && branch.is_conditional() {
                    frame_for_offset(layout.offsets[item] + 8, &mut frames_at);
                }
            }
        }

        // Exception table, with ranges split around unreachable code
        let mut exception_table = vec![];
        for block in &self.exception_handlers {
            let start = offset_of(&block.start)?;
            let end = offset_of(&block.end)?;
            let handler = offset_of(&block.handler)?;
            let catch_type = match &block.catch_type {
                None => ClassConstantIndex(ConstantIndex(0)),
                Some(class) => class.constant_index(constants)?,
            };
            let pieces = live_pieces(start, end, &dead_runs);
            if pieces.is_empty() {
                log::debug!("Dropping exception range {}..{} covering only dead code", start, end);
                continue;
            }
            frame_for_offset(handler, &mut frames_at);
            for (start, end) in pieces {
                exception_table.push(ExceptionHandler {
                    start_pc: BytecodeIndex(start as u16),
                    end_pc: BytecodeIndex(end as u16),
                    handler_pc: BytecodeIndex(handler as u16),
                    catch_type,
                });
            }
        }
        for (start, _) in &dead_runs {
            frames_at.insert(*start, FrameAt::Unreachable);
        }

        // Bytecode
        let dead_run_ends: HashSet<usize> = dead_runs.iter().map(|(_, end)| *end).collect();
        let mut code_array: Vec<u8> = Vec::with_capacity(layout.code_length);
        for (item, code_item) in self.items.iter().enumerate() {
            let offset = layout.offsets[item];
            match (code_item, &lowered[item]) {
                (CodeItem::Instruction(_) | CodeItem::Branch(_), _) if !is_live(item) => {
                    let opcode = if dead_run_ends.contains(&(offset + 1)) {
                        0xbf
                    } else {
                        0x00
                    };
                    code_array.push(opcode);
                }
                (CodeItem::Branch(branch), _) => {
                    let branch = branch.map_labels(|label| offset_of(label))?;
                    branch.serialize_at(offset, layout.widened[item], &mut code_array)?;
                }
                (CodeItem::Instruction(_), Some(insn)) => insn.serialize(&mut code_array)?,
                _ => (),
            }
        }
        debug_assert_eq!(code_array.len(), layout.code_length);

        // Attributes of the code
        let mut attributes = vec![];

        let line_numbers: Vec<LineNumber> = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(item, code_item)| match code_item {
                CodeItem::LineNumber(line) if layout.offsets[item] < layout.code_length => {
                    Some(LineNumber {
                        start_pc: BytecodeIndex(layout.offsets[item] as u16),
                        line_number: *line,
                    })
                }
                _ => None,
            })
            .collect();
        if !line_numbers.is_empty() {
            attributes.push(constants.get_attribute(LineNumberTable(line_numbers))?);
        }

        let mut max_locals = inferred
            .max_locals
            .max(context.method.descriptor.parameter_length(!context.method.is_static));
        let mut variables = vec![];
        let mut variable_types = vec![];
        for range in &self.local_variables {
            let (entry, extent) = local_variable(range, &offset_of, constants)?;
            max_locals = max_locals.max(extent);
            if range.is_type_table {
                variable_types.push(entry);
            } else {
                variables.push(entry);
            }
        }
        if !variables.is_empty() {
            attributes.push(constants.get_attribute(LocalVariableTable(variables))?);
        }
        if !variable_types.is_empty() {
            attributes.push(constants.get_attribute(LocalVariableTypeTable(variable_types))?);
        }

        if context.emit_stack_map && !frames_at.is_empty() {
            let table = stack_map_table(&frames_at, &inferred, &layout.offsets, context, constants)?;
            attributes.push(constants.get_attribute(table)?);
        }

        let max_stack = if dead_runs.is_empty() {
            inferred.max_stack
        } else {
            inferred.max_stack.max(1)
        };

        Ok(Code {
            max_stack: max_stack as u16,
            max_locals: max_locals as u16,
            code_array: BytecodeArray(code_array),
            exception_table,
            attributes,
        })
    }
}

/// Resolve the operands of an instruction into constant pool indices
fn lower_instruction(
    insn: &SymInstruction,
    constants: &mut ConstantsPool,
) -> Result<PoolInstruction, ConstantPoolOverflow> {
    let constants = RefCell::new(constants);
    insn.map(
        |class| class.constant_index(&mut constants.borrow_mut()),
        |constant| constant.constant_index(&mut constants.borrow_mut()),
        |field| field.constant_index(&mut constants.borrow_mut()),
        |method| method.constant_index(&mut constants.borrow_mut()),
        |indy| indy.constant_index(&mut constants.borrow_mut()),
    )
}

/// Parts of `start..end` not overlapping any of the (sorted, disjoint) dead runs
fn live_pieces(start: usize, end: usize, dead_runs: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut pieces = vec![];
    let mut piece_start = start;
    for (dead_start, dead_end) in dead_runs {
        if *dead_end <= piece_start || *dead_start >= end {
            continue;
        }
        if *dead_start > piece_start {
            pieces.push((piece_start, *dead_start));
        }
        piece_start = piece_start.max(*dead_end);
    }
    if piece_start < end {
        pieces.push((piece_start, end));
    }
    pieces
}

/// Build a local variable table entry, along with the number of local slots it requires
fn local_variable(
    range: &LocalVariableRange,
    offset_of: &impl Fn(&super::SynLabel) -> Result<usize, Error>,
    constants: &ConstantsPool,
) -> Result<(LocalVariable, usize), Error> {
    let start = offset_of(&range.start)?;
    let end = offset_of(&range.end)?;
    if end < start {
        return Err(Error::Malformed(format!(
            "local variable range {}..{} is backwards",
            start, end
        )));
    }
    let descriptor = constants.utf8(range.descriptor_index)?;
    let width = if descriptor.starts_with('J') || descriptor.starts_with('D') {
        2
    } else {
        1
    };
    let entry = LocalVariable {
        start_pc: BytecodeIndex(start as u16),
        length: (end - start) as u16,
        name_index: range.name_index,
        descriptor_index: range.descriptor_index,
        index: range.index,
    };
    Ok((entry, range.index as usize + width))
}

fn stack_map_table(
    frames_at: &BTreeMap<usize, FrameAt>,
    inferred: &InferredFrames,
    item_offsets: &[usize],
    context: &EncodeContext<'_>,
    constants: &mut ConstantsPool,
) -> Result<StackMapTable, Error> {
    let item_offset = |item: usize| item_offsets[item] as u16;
    let method = &context.method;
    let mut previous = VFrame::initial(
        method.this_class,
        method.name,
        method.descriptor,
        method.is_static,
    )
    .into_compact(constants, item_offset)?;
    let unreachable = CompactFrame {
        locals: vec![],
        stack: vec![VType::object(BinaryName::THROWABLE).into_serializable(constants, item_offset)?],
    };

    let mut entries = vec![];
    let mut previous_offset: Option<usize> = None;
    for (offset, frame_at) in frames_at {
        let frame = match frame_at {
            FrameAt::Unreachable => unreachable.clone(),
            FrameAt::Inferred(item) => match &inferred.frames[*item] {
                Some(frame) => frame.into_compact(constants, item_offset)?,
                None => continue,
            },
        };
        let offset_delta = match previous_offset {
            None => *offset,
            Some(previous_offset) => offset - previous_offset - 1,
        } as u16;
        entries.push(frame.stack_map_frame(offset_delta, &previous));
        previous = frame;
        previous_offset = Some(*offset);
    }
    Ok(StackMapTable(entries))
}
